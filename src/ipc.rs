//! Line-delimited JSON protocol between the host binding and a supervisor.
//!
//! One request per input line, one response per output line:
//!
//! ```text
//! → {"cmd":"launch","appId":"editor","executablePath":"/usr/bin/gedit"}
//! ← {"ok":true,"data":{"appId":"editor","status":"running",...}}
//! → {"cmd":"terminate","appId":"nope"}
//! ← {"ok":false,"error":{"kind":"NotFound","message":"application 'nope' not found or not running"}}
//! ```

use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::SupervisorError;
use crate::supervisor::Supervisor;

/// Error kind reported for lines that are not a valid request.
pub const BAD_REQUEST: &str = "BadRequest";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Request {
    Launch {
        app_id: String,
        executable_path: String,
    },
    Terminate {
        app_id: String,
        #[serde(default)]
        force: bool,
    },
    Status {
        app_id: String,
    },
    List,
    Elapsed {
        app_id: String,
    },
    Forget {
        app_id: String,
    },
    Prune,
    Modified,
    Icon {
        executable_path: String,
    },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message: message.into(),
            }),
        }
    }

    fn from_result<T: Serialize>(result: std::result::Result<T, SupervisorError>) -> Self {
        match result {
            Ok(value) => Self::success(to_value(&value)),
            Err(e) => e.into(),
        }
    }
}

impl From<SupervisorError> for Response {
    fn from(e: SupervisorError) -> Self {
        Self::failure(e.kind(), e.to_string())
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    // records and primitives always serialize
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Execute one request against `supervisor`.
pub fn dispatch(supervisor: &Supervisor, request: Request) -> Response {
    match request {
        Request::Launch {
            app_id,
            executable_path,
        } => Response::from_result(supervisor.launch(&app_id, &executable_path)),
        Request::Terminate { app_id, force } => {
            let result = if force {
                supervisor.force_terminate(&app_id)
            } else {
                supervisor.terminate(&app_id)
            };
            Response::from_result(result)
        }
        Request::Status { app_id } => Response::success(to_value(&supervisor.status(&app_id))),
        Request::List => Response::success(to_value(&supervisor.list_running())),
        Request::Elapsed { app_id } => Response::success(json!(supervisor.elapsed(&app_id))),
        Request::Forget { app_id } => Response::from_result(supervisor.forget(&app_id)),
        Request::Prune => Response::success(json!({ "removed": supervisor.prune_finished() })),
        Request::Modified => Response::success(json!({ "state": supervisor.take_modification() })),
        Request::Icon { executable_path } => {
            let icon = supervisor.icon(&executable_path).map(|bytes| BASE64.encode(bytes));
            Response::success(json!(icon))
        }
        Request::Shutdown => Response::success(json!({ "shutdown": true })),
    }
}

/// Parse one input line. Malformed input becomes a `BadRequest` response.
pub fn parse_request(line: &str) -> std::result::Result<Request, Response> {
    serde_json::from_str(line).map_err(|e| Response::failure(BAD_REQUEST, e.to_string()))
}

/// Answer requests from `reader` on `writer` until EOF or a `shutdown`
/// request.
pub fn serve<R: BufRead, W: Write>(supervisor: &Supervisor, reader: R, mut writer: W) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("Failed to read request")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, stop) = match parse_request(line) {
            Ok(request) => {
                debug!("request: {request:?}");
                let stop = request == Request::Shutdown;
                (dispatch(supervisor, request), stop)
            }
            Err(response) => {
                warn!("rejected malformed request: {line}");
                (response, false)
            }
        };

        serde_json::to_writer(&mut writer, &response).context("Failed to encode response")?;
        writer.write_all(b"\n").context("Failed to write response")?;
        writer.flush().context("Failed to flush response")?;

        if stop {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use crate::platform::fake::FakeControl;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    fn supervisor() -> Supervisor {
        let config = SupervisorConfig::default().with_monitor_interval(Duration::from_secs(3600));
        Supervisor::with_control(config, Arc::new(FakeControl::new())).unwrap()
    }

    fn run(supervisor: &Supervisor, input: &str) -> Vec<Value> {
        let mut out = Vec::new();
        serve(supervisor, input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn parses_camel_case_fields() {
        let request = parse_request(r#"{"cmd":"terminate","appId":"a","force":true}"#).unwrap();
        assert_eq!(
            request,
            Request::Terminate {
                app_id: "a".into(),
                force: true
            }
        );
        assert_eq!(parse_request(r#"{"cmd":"list"}"#).unwrap(), Request::List);
    }

    #[test]
    fn full_session() {
        let sup = supervisor();
        let replies = run(
            &sup,
            concat!(
                r#"{"cmd":"launch","appId":"a","executablePath":"/bin/app"}"#,
                "\n",
                r#"{"cmd":"launch","appId":"a","executablePath":"/bin/app"}"#,
                "\n\n",
                r#"{"cmd":"status","appId":"a"}"#,
                "\n",
                r#"{"cmd":"terminate","appId":"a"}"#,
                "\n",
                r#"{"cmd":"terminate","appId":"a"}"#,
                "\n",
                r#"{"cmd":"list"}"#,
                "\n",
                r#"{"cmd":"modified"}"#,
                "\n",
            ),
        );

        assert_eq!(replies.len(), 7);
        assert_eq!(replies[0]["ok"], true);
        assert_eq!(replies[0]["data"]["status"], "running");
        assert_eq!(replies[1]["error"]["kind"], "AlreadyRunning");
        assert_eq!(replies[2]["data"]["appId"], "a");
        assert_eq!(replies[3]["data"]["status"], "completed");
        assert_eq!(replies[3]["data"]["exitCode"], 0);
        assert_eq!(replies[4]["error"]["kind"], "NotFound");
        assert_eq!(replies[5]["data"].as_array().unwrap().len(), 1);
        assert_eq!(replies[6]["data"]["state"], true);
    }

    #[test]
    fn malformed_lines_do_not_stop_the_loop() {
        let sup = supervisor();
        let replies = run(&sup, "not json\n{\"cmd\":\"explode\"}\n{\"cmd\":\"status\",\"appId\":\"x\"}\n");

        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["error"]["kind"], BAD_REQUEST);
        assert_eq!(replies[1]["error"]["kind"], BAD_REQUEST);
        assert_eq!(replies[2]["data"]["status"], "unknown");
    }

    #[test]
    fn shutdown_ends_the_session() {
        let sup = supervisor();
        let replies = run(&sup, "{\"cmd\":\"shutdown\"}\n{\"cmd\":\"list\"}\n");
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["data"]["shutdown"], true);
    }

    #[test]
    fn icon_is_base64_or_null() {
        let sup = supervisor().with_icon_source(|path: &Path| {
            path.ends_with("app").then(|| vec![0x89, b'P', b'N', b'G'])
        });
        let replies = run(
            &sup,
            "{\"cmd\":\"icon\",\"executablePath\":\"/bin/app\"}\n{\"cmd\":\"icon\",\"executablePath\":\"/bin/x\"}\n",
        );
        assert_eq!(replies[0]["data"], "iVBORw==");
        assert!(replies[1]["data"].is_null());
    }

    #[test]
    fn elapsed_forget_and_prune() {
        let sup = supervisor();
        sup.launch("a", "/bin/app").unwrap();
        sup.launch("b", "/bin/app").unwrap();
        sup.terminate("a").unwrap();
        sup.terminate("b").unwrap();

        let replies = run(
            &sup,
            "{\"cmd\":\"elapsed\",\"appId\":\"a\"}\n{\"cmd\":\"forget\",\"appId\":\"a\"}\n{\"cmd\":\"prune\"}\n",
        );
        assert_eq!(replies[0]["data"], 0.0);
        assert_eq!(replies[1]["data"]["appId"], "a");
        assert_eq!(replies[2]["data"]["removed"], 1);
    }
}
