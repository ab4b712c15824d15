//! Route handler backed by a script function

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cardinal_kernel::{ModuleRequest, ModuleResponse, RouteHandler};
use rhai::{AST, CallFnOptions, Dynamic, Engine, EvalAltResult, Map, Scope};
use tracing::error;

use super::convert::{dynamic_to_json, json_to_dynamic};

/// Calls one script function per request.
///
/// Holds its own references to the engine and compiled script, so requests
/// already dispatched keep running on this code after the module is reloaded.
pub struct ScriptHandler {
    module: String,
    engine: Arc<Engine>,
    ast: Arc<AST>,
    function: String,
    /// 0 or 1; with 1 the function receives the request map.
    arity: usize,
}

impl ScriptHandler {
    pub fn new(
        module: impl Into<String>,
        engine: Arc<Engine>,
        ast: Arc<AST>,
        function: impl Into<String>,
        arity: usize,
    ) -> Self {
        Self {
            module: module.into(),
            engine,
            ast,
            function: function.into(),
            arity,
        }
    }
}

#[async_trait]
impl RouteHandler for ScriptHandler {
    async fn handle(&self, request: ModuleRequest) -> ModuleResponse {
        let engine = self.engine.clone();
        let ast = self.ast.clone();
        let function = self.function.clone();
        let arity = self.arity;

        let outcome = tokio::task::spawn_blocking(move || {
            let args = if arity == 0 {
                Vec::new()
            } else {
                vec![request_to_dynamic(&request)]
            };
            let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
            let mut scope = Scope::new();
            engine.call_fn_with_options::<Dynamic>(options, &mut scope, &ast, &function, args)
        })
        .await;

        match outcome {
            Ok(Ok(value)) => response_from_value(&value),
            Ok(Err(err)) => match thrown_status(&err) {
                Some(response) => response,
                None => {
                    error!(
                        module = %self.module,
                        handler = %self.function,
                        error = %err,
                        "Script handler failed"
                    );
                    ModuleResponse::error(500, "Internal Server Error")
                }
            },
            Err(e) => {
                error!(
                    module = %self.module,
                    handler = %self.function,
                    error = %e,
                    "Script handler task failed"
                );
                ModuleResponse::error(500, "Internal Server Error")
            }
        }
    }
}

fn string_map(values: &BTreeMap<String, String>) -> Dynamic {
    let map: Map = values
        .iter()
        .map(|(k, v)| (k.as_str().into(), Dynamic::from(v.clone())))
        .collect();
    Dynamic::from(map)
}

/// The request as the script sees it: a map with `method`, `path`, `params`,
/// `query`, `headers` and `body`.
pub fn request_to_dynamic(request: &ModuleRequest) -> Dynamic {
    let mut map = Map::new();
    map.insert("method".into(), Dynamic::from(request.method.as_str().to_string()));
    map.insert("path".into(), Dynamic::from(request.path.clone()));
    map.insert("params".into(), string_map(&request.params));
    map.insert("query".into(), string_map(&request.query));
    map.insert("headers".into(), string_map(&request.headers));
    map.insert(
        "body".into(),
        request.body.as_ref().map_or(Dynamic::UNIT, json_to_dynamic),
    );
    Dynamic::from(map)
}

fn status_code(value: Option<&Dynamic>) -> Option<u16> {
    let code = value?.as_int().ok()?;
    u16::try_from(code).ok().filter(|c| (100..=599).contains(c))
}

/// Map a handler's return value to a response.
///
/// `()` is 204. A map with an integer `status` and a `body` key sets both
/// (plus optional string `headers`). Anything else is a 200 JSON body.
pub fn response_from_value(value: &Dynamic) -> ModuleResponse {
    if value.is_unit() {
        return ModuleResponse::no_content();
    }

    if value.is_map() {
        let map = value.clone().cast::<Map>();
        if map.contains_key("status") && map.contains_key("body") {
            let Some(status) = status_code(map.get("status")) else {
                return ModuleResponse::error(500, "Handler returned an invalid status code");
            };
            let body = map.get("body").map(dynamic_to_json).unwrap_or_default();
            let mut response = if body.is_null() {
                ModuleResponse {
                    status,
                    body: None,
                    headers: Vec::new(),
                }
            } else {
                ModuleResponse::json(status, body)
            };
            if let Some(headers) = map.get("headers").filter(|h| h.is_map()) {
                for (name, v) in headers.clone().cast::<Map>() {
                    response = response.with_header(name.to_string(), v.to_string());
                }
            }
            return response;
        }
    }

    ModuleResponse::ok(dynamic_to_json(value))
}

/// `throw #{ status: 404, detail: "..." }` becomes that status with a
/// `{"detail": ...}` body. Other failures yield `None`.
fn thrown_status(err: &EvalAltResult) -> Option<ModuleResponse> {
    match err {
        EvalAltResult::ErrorRuntime(value, _) if value.is_map() => {
            let map = value.clone().cast::<Map>();
            let status = status_code(map.get("status"))?;
            let detail = map
                .get("detail")
                .map(dynamic_to_json)
                .unwrap_or(serde_json::Value::Null);
            Some(ModuleResponse::json(
                status,
                serde_json::json!({ "detail": detail }),
            ))
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => thrown_status(inner),
        _ => None,
    }
}
