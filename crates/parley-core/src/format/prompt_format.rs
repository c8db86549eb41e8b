use serde::{Deserialize, Serialize};

use crate::format::prompting::{ChatMlTemplate, ChatTemplate, Llama3Template};

/// Built-in chat templates, selectable from config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    #[default]
    Llama3,
    ChatMl,
}

/// Factory: select a template from a `TemplateKind`.
pub fn select_template(kind: TemplateKind) -> Box<dyn ChatTemplate> {
    match kind {
        TemplateKind::Llama3 => Box::new(Llama3Template),
        TemplateKind::ChatMl => Box::new(ChatMlTemplate),
    }
}
