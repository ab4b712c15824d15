//! Route declaration API for scripts
//!
//! ```rhai
//! let router = router("/items");
//! router.get("/", "list_items");
//! router.post("/", Fn("create_item"));
//! router.get("/{item_id}", "get_item");
//! ```

use cardinal_kernel::HttpMethod;
use rhai::{Engine, EvalAltResult, FnPtr, INT};

/// A route group as declared by a script, before handlers are bound.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptRouter {
    pub prefix: String,
    pub routes: Vec<ScriptRoute>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRoute {
    pub method: HttpMethod,
    pub path: String,
    /// Name of the script function handling the route.
    pub handler: String,
}

impl ScriptRouter {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            routes: Vec::new(),
        }
    }

    pub fn add(&mut self, method: HttpMethod, path: &str, handler: &str) {
        self.routes.push(ScriptRoute {
            method,
            path: path.to_string(),
            handler: handler.to_string(),
        });
    }
}

const ROUTE_METHODS: [(&str, HttpMethod); 5] = [
    ("get", HttpMethod::Get),
    ("post", HttpMethod::Post),
    ("put", HttpMethod::Put),
    ("patch", HttpMethod::Patch),
    ("delete", HttpMethod::Delete),
];

pub(crate) fn register_router_api(engine: &mut Engine) {
    engine.register_type_with_name::<ScriptRouter>("Router");
    engine.register_fn("router", || ScriptRouter::default());
    engine.register_fn("router", |prefix: &str| ScriptRouter::new(prefix));
    engine.register_get("prefix", |r: &mut ScriptRouter| r.prefix.clone());
    engine.register_fn("route_count", |r: &mut ScriptRouter| r.routes.len() as INT);

    for (name, method) in ROUTE_METHODS {
        engine.register_fn(name, move |r: &mut ScriptRouter, path: &str, handler: &str| {
            r.add(method, path, handler);
        });
        engine.register_fn(
            name,
            move |r: &mut ScriptRouter,
                  path: &str,
                  handler: FnPtr|
                  -> Result<(), Box<EvalAltResult>> {
                if !handler.curry().is_empty() {
                    return Err(format!(
                        "handler for {method} {path} captures variables; use a named function"
                    )
                    .into());
                }
                r.add(method, path, handler.fn_name());
                Ok(())
            },
        );
    }
}
