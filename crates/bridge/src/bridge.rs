//! Handle registry and method dispatch
//!
//! Scripts never hold a `Query`; they hold a `HandleId`. Every call is a
//! method name plus a JSON argument array, the same shape as a CDP command,
//! and every collection-valued result is registered and returned as a fresh
//! handle. Writers return the receiver's own handle so scripts can chain.

use ahash::AHashMap;
use docquery::{Document, ParseConfig, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::value::{Args, HandleId, ScriptValue};

/// Method names accepted by [`Bridge::call`]. `each` is not listed: it needs
/// a host callback and goes through [`Bridge::each`].
pub const METHODS: &[&str] = &[
    "find",
    "children",
    "parent",
    "closest",
    "first",
    "last",
    "eq",
    "filter",
    "is",
    "next",
    "prev",
    "siblings",
    "length",
    "text",
    "html",
    "outerHtml",
    "attr",
    "attrs",
    "hasClass",
    "removeAttr",
    "setText",
    "setHtml",
];

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Shows up in every log line of this bridge
    pub id: String,
    /// Live handles allowed at once
    pub max_handles: usize,
    pub parse: ParseConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            max_handles: 65_536,
            parse: ParseConfig::default(),
        }
    }
}

/// One per script sandbox
pub struct Bridge {
    config: BridgeConfig,
    handles: AHashMap<HandleId, Query>,
    next_handle: HandleId,
}

impl Bridge {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        Self {
            config,
            handles: AHashMap::new(),
            next_handle: 1,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Parse a page and return a handle over its Document node
    pub fn new_document(&mut self, html: &str) -> Result<HandleId> {
        let doc = Document::parse_with_config(html, self.config.parse.clone());
        let handle = self.register(doc.root())?;
        tracing::debug!("[{}] New document #{}", self.config.id, handle);
        Ok(handle)
    }

    /// Like [`Bridge::new_document`] for undecoded bytes
    pub fn new_document_bytes(&mut self, bytes: &[u8]) -> Result<HandleId> {
        let doc = Document::parse_bytes(bytes, self.config.parse.clone())?;
        let handle = self.register(doc.root())?;
        tracing::debug!("[{}] New document #{}", self.config.id, handle);
        Ok(handle)
    }

    /// Hand a collection to the script side
    pub fn register(&mut self, query: Query) -> Result<HandleId> {
        // Id 0 is reserved, so at most `HandleId::MAX` handles fit
        let limit = self.config.max_handles.min(HandleId::MAX as usize);
        if self.handles.len() >= limit {
            tracing::debug!(
                "[{}] Handle limit reached: {}",
                self.config.id,
                self.handles.len()
            );
            return Err(BridgeError::HandleLimit(self.handles.len()));
        }
        // Below the limit a free id always exists; skip live ones after wrap-around
        let mut handle = self.next_handle;
        while self.handles.contains_key(&handle) {
            handle = Self::after(handle);
        }
        self.next_handle = Self::after(handle);
        self.handles.insert(handle, query);
        Ok(handle)
    }

    /// Next id in sequence; 0 is never handed out
    fn after(handle: HandleId) -> HandleId {
        handle.wrapping_add(1).max(1)
    }

    pub fn query(&self, handle: HandleId) -> Result<&Query> {
        self.handles
            .get(&handle)
            .ok_or(BridgeError::UnknownHandle(handle))
    }

    /// Free a handle. Returns false when it was not live.
    pub fn release(&mut self, handle: HandleId) -> bool {
        self.handles.remove(&handle).is_some()
    }

    /// Live handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Dispatch `method` on the collection behind `handle`
    pub fn call(&mut self, handle: HandleId, method: &str, args: &[Value]) -> Result<ScriptValue> {
        tracing::trace!(
            "[{}] #{}.{}({} args)",
            self.config.id,
            handle,
            method,
            args.len()
        );

        let result = self.dispatch(handle, method, &Args::new(method, args));
        if let Err(e) = &result {
            tracing::debug!("[{}] #{}.{} failed: {}", self.config.id, handle, method, e);
        }
        result
    }

    /// Run `callback(bridge, index, item_handle)` for every node behind
    /// `handle`. Item handles stay live until the host releases them. The
    /// first callback error stops the loop and is returned unchanged.
    pub fn each<F>(&mut self, handle: HandleId, mut callback: F) -> Result<()>
    where
        F: FnMut(&mut Bridge, usize, HandleId) -> Result<()>,
    {
        tracing::trace!("[{}] #{}.each", self.config.id, handle);
        let query = self.query(handle)?.clone();
        for (index, item) in query.iter().enumerate() {
            let item = self.register(item)?;
            callback(self, index, item)?;
        }
        Ok(())
    }

    fn dispatch(&mut self, handle: HandleId, method: &str, args: &Args<'_>) -> Result<ScriptValue> {
        let query = self.query(handle)?.clone();

        let derived = match method {
            "find" => query.find(args.str(0)?)?,
            "children" => match args.opt_str(0)? {
                Some(selector) => query.children_matching(selector)?,
                None => query.children(),
            },
            "parent" => query.parent(),
            "closest" => query.closest(args.str(0)?)?,
            "first" => query.first(),
            "last" => query.last(),
            "eq" => {
                let index = args.int(0)?;
                let index = isize::try_from(index).map_err(|_| BridgeError::InvalidArgument {
                    method: method.to_string(),
                    index: 0,
                    expected: "index in range",
                })?;
                query.at(index)
            }
            "filter" => query.filter(args.str(0)?)?,
            "next" => query.next(),
            "prev" => query.prev(),
            "siblings" => query.siblings(),

            "is" => return Ok(ScriptValue::Bool(query.is(args.str(0)?)?)),
            "length" => return Ok(ScriptValue::Number(query.length() as f64)),
            "text" => return Ok(ScriptValue::String(query.text())),
            "html" => return Ok(ScriptValue::String(query.html())),
            "outerHtml" => return Ok(ScriptValue::String(query.outer_html())),
            "hasClass" => return Ok(ScriptValue::Bool(query.has_class(args.str(0)?))),
            "attrs" => {
                let pairs = query
                    .attrs()
                    .into_iter()
                    .map(|a| {
                        ScriptValue::Array(vec![
                            ScriptValue::String(a.name),
                            ScriptValue::String(a.value),
                        ])
                    })
                    .collect();
                return Ok(ScriptValue::Array(pairs));
            }

            // Writers hand back the receiver
            "attr" if args.len() >= 2 => {
                query.set_attr(args.str(0)?, &args.string_like(1)?);
                return Ok(ScriptValue::Handle(handle));
            }
            "attr" => return Ok(query.attr(args.str(0)?).into()),
            "removeAttr" => {
                query.remove_attr(args.str(0)?);
                return Ok(ScriptValue::Handle(handle));
            }
            "setText" => {
                query.set_text(&args.string_like(0)?);
                return Ok(ScriptValue::Handle(handle));
            }
            "setHtml" => {
                query.set_html(args.str(0)?);
                return Ok(ScriptValue::Handle(handle));
            }

            _ => return Err(BridgeError::UnknownMethod(method.to_string())),
        };

        Ok(ScriptValue::Handle(self.register(derived)?))
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}
