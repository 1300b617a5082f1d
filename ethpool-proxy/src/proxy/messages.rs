//! JSON-RPC message shapes spoken with miners.
//!
//! One JSON object per line. Requests carry an optional `worker` member
//! naming the rig. Responses echo the request id; unsolicited job pushes use
//! id 0.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::EnumString;

use super::error::ErrorReply;

/// RPC methods understood by the proxy.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
pub enum Method {
    #[strum(serialize = "eth_submitLogin")]
    SubmitLogin,

    #[strum(serialize = "eth_getWork")]
    GetWork,

    #[strum(serialize = "eth_submitWork")]
    SubmitWork,

    #[strum(serialize = "eth_getBlockByNumber")]
    GetBlockByNumber,

    #[strum(serialize = "eth_submitHashrate")]
    SubmitHashrate,

    /// Anything else, carrying the name the client sent.
    #[strum(default)]
    Unknown(String),
}

impl Method {
    pub fn from_name(name: &str) -> Self {
        // The default variant makes parsing infallible.
        name.parse().unwrap_or_else(|_| Method::Unknown(name.to_string()))
    }
}

/// A request line from a miner.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,

    pub method: String,

    #[serde(default)]
    pub params: Option<Value>,

    #[serde(default)]
    pub worker: String,
}

impl Request {
    /// Params as a list of strings.
    ///
    /// Missing or null params are an empty list. Returns `None` when params
    /// are present but not an array of strings.
    pub fn string_params(&self) -> Option<Vec<String>> {
        match &self.params {
            None | Some(Value::Null) => Some(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            Some(_) => None,
        }
    }
}

/// A response or push line to a miner.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    pub id: Value,

    pub jsonrpc: String,

    pub result: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
}

impl Response {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            result,
            error: None,
        }
    }

    pub fn error(id: Value, error: ErrorReply) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            result: Value::Null,
            error: Some(error),
        }
    }

    /// Unsolicited job notification.
    pub fn push(result: Value) -> Self {
        Self::result(Value::from(0), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("eth_submitLogin", Method::SubmitLogin)]
    #[test_case("eth_getWork", Method::GetWork)]
    #[test_case("eth_submitWork", Method::SubmitWork)]
    #[test_case("eth_getBlockByNumber", Method::GetBlockByNumber)]
    #[test_case("eth_submitHashrate", Method::SubmitHashrate)]
    #[test_case("mining.subscribe", Method::Unknown("mining.subscribe".into()))]
    #[test_case("eth_getwork", Method::Unknown("eth_getwork".into()); "case sensitive")]
    fn test_method_from_name(name: &str, expected: Method) {
        assert_eq!(Method::from_name(name), expected);
    }

    #[test]
    fn test_request_decoding() {
        let request: Request = serde_json::from_str(
            r#"{"id":1,"jsonrpc":"2.0","method":"eth_submitLogin","params":["0xabc"],"worker":"rig1"}"#,
        )
        .unwrap();
        assert_eq!(request.id, json!(1));
        assert_eq!(request.worker, "rig1");
        assert_eq!(request.string_params(), Some(vec!["0xabc".to_string()]));
    }

    #[test]
    fn test_string_params() {
        let mut request: Request =
            serde_json::from_str(r#"{"id":1,"method":"eth_getWork"}"#).unwrap();
        assert_eq!(request.string_params(), Some(vec![]));
        assert_eq!(request.worker, "");

        request.params = Some(json!([1, 2]));
        assert_eq!(request.string_params(), None);

        request.params = Some(json!({"a": 1}));
        assert_eq!(request.string_params(), None);
    }

    #[test]
    fn test_response_encoding() {
        let ok = Response::result(json!(7), json!(true));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"id": 7, "jsonrpc": "2.0", "result": true})
        );

        let err = Response::error(json!(7), ErrorReply { code: 22, message: "Duplicate share".into() });
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({
                "id": 7,
                "jsonrpc": "2.0",
                "result": null,
                "error": {"code": 22, "message": "Duplicate share"}
            })
        );

        let push = Response::push(json!(["0x1", "0x2", "0x3"]));
        assert_eq!(push.id, json!(0));
    }
}
