use std::path::PathBuf;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Error,
}

/// One-shot user-facing message attached to a page.
#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.into(),
        }
    }
}

/// What a handler produced: the data a page renders plus any flash messages.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub context: serde_json::Value,
    pub flash: Vec<Flash>,
}

impl Outcome {
    pub fn new(context: serde_json::Value) -> Self {
        Self {
            context,
            flash: Vec::new(),
        }
    }

    pub fn with_flash(mut self, flash: Flash) -> Self {
        self.flash.push(flash);
        self
    }

    /// Domain-method result: the context object with `flash` folded in.
    pub fn into_result(self) -> serde_json::Value {
        let mut ctx = self.context;
        if let Some(obj) = ctx.as_object_mut() {
            obj.insert("flash".to_string(), serde_json::json!(self.flash));
        }
        ctx
    }
}
