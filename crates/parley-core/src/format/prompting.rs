//! Chat templates: conversation turns -> segmented prompt.

use parley_abi::{ChatTurn, Role};

use crate::error::{Result, SessionError};
use crate::format::format::FormattedPrompt;

/// Render a full dialog into a prompt that ends with an open assistant turn.
pub trait ChatTemplate: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, turns: &[ChatTurn]) -> Result<FormattedPrompt>;

    /// Every control-token string this template can produce. Generated text
    /// is filtered against these before it reaches the caller.
    fn control_markers(&self) -> &'static [&'static str];

    /// Marker that closes a turn; must map to exactly one vocabulary token.
    fn end_of_turn(&self) -> &'static str;
}

/// Shape checks shared by every template.
pub fn validate_turns(turns: &[ChatTurn]) -> Result<()> {
    if turns.is_empty() {
        return Err(SessionError::Template("conversation is empty".into()));
    }
    if !turns.iter().any(|t| t.role == Role::User) {
        return Err(SessionError::Template(
            "conversation has no user turn".into(),
        ));
    }
    if let Some(i) = turns
        .iter()
        .skip(1)
        .position(|t| t.role == Role::System)
    {
        return Err(SessionError::Template(format!(
            "system turn at position {} (only position 0 is allowed)",
            i + 1
        )));
    }
    Ok(())
}

/// Llama 3 instruct layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Llama3Template;

impl Llama3Template {
    pub const BEGIN_OF_TEXT: &'static str = "<|begin_of_text|>";
    pub const END_OF_TEXT: &'static str = "<|end_of_text|>";
    pub const START_HEADER: &'static str = "<|start_header_id|>";
    pub const END_HEADER: &'static str = "<|end_header_id|>";
    pub const EOT: &'static str = "<|eot_id|>";

    const MARKERS: [&'static str; 5] = [
        Self::BEGIN_OF_TEXT,
        Self::END_OF_TEXT,
        Self::START_HEADER,
        Self::END_HEADER,
        Self::EOT,
    ];
}

impl ChatTemplate for Llama3Template {
    fn name(&self) -> &'static str {
        "llama3"
    }

    fn render(&self, turns: &[ChatTurn]) -> Result<FormattedPrompt> {
        validate_turns(turns)?;
        let mut p = FormattedPrompt::default();
        p.push_markup(Self::BEGIN_OF_TEXT);
        for t in turns {
            p.push_markup(Self::START_HEADER)
                .push_text(t.role.as_str())
                .push_markup(Self::END_HEADER)
                .push_text(t.content.as_str())
                .push_markup(Self::EOT);
        }
        p.push_markup(Self::START_HEADER)
            .push_text(Role::Assistant.as_str())
            .push_markup(Self::END_HEADER);
        Ok(p)
    }

    fn control_markers(&self) -> &'static [&'static str] {
        &Self::MARKERS
    }

    fn end_of_turn(&self) -> &'static str {
        Self::EOT
    }
}

/// ChatML (`<|im_start|>role\n...<|im_end|>`).
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatMlTemplate;

impl ChatMlTemplate {
    pub const IM_START: &'static str = "<|im_start|>";
    pub const IM_END: &'static str = "<|im_end|>";

    const MARKERS: [&'static str; 2] = [Self::IM_START, Self::IM_END];
}

impl ChatTemplate for ChatMlTemplate {
    fn name(&self) -> &'static str {
        "chatml"
    }

    fn render(&self, turns: &[ChatTurn]) -> Result<FormattedPrompt> {
        validate_turns(turns)?;
        let mut p = FormattedPrompt::default();
        for t in turns {
            p.push_markup(Self::IM_START)
                .push_text(format!("{}\n", t.role))
                .push_text(t.content.as_str())
                .push_markup(Self::IM_END)
                .push_text("\n");
        }
        p.push_markup(Self::IM_START)
            .push_text(format!("{}\n", Role::Assistant));
        Ok(p)
    }

    fn control_markers(&self) -> &'static [&'static str] {
        &Self::MARKERS
    }

    fn end_of_turn(&self) -> &'static str {
        Self::IM_END
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format::Segment;

    fn dialog() -> Vec<ChatTurn> {
        vec![
            ChatTurn::system("You are terse."),
            ChatTurn::user("Hi"),
            ChatTurn::assistant("Hello."),
            ChatTurn::user("2+2?"),
        ]
    }

    #[test]
    fn llama3_layout() {
        let p = Llama3Template.render(&dialog()).unwrap();
        assert_eq!(
            p.text(),
            "<|begin_of_text|>\
             <|start_header_id|>system<|end_header_id|>You are terse.<|eot_id|>\
             <|start_header_id|>user<|end_header_id|>Hi<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>Hello.<|eot_id|>\
             <|start_header_id|>user<|end_header_id|>2+2?<|eot_id|>\
             <|start_header_id|>assistant<|end_header_id|>"
        );
    }

    #[test]
    fn chatml_layout() {
        let p = ChatMlTemplate.render(&[ChatTurn::user("Hi")]).unwrap();
        assert_eq!(
            p.text(),
            "<|im_start|>user\nHi<|im_end|>\n<|im_start|>assistant\n"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = Llama3Template.render(&dialog()).unwrap();
        let b = Llama3Template.render(&dialog()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn user_markup_stays_in_a_text_segment() {
        let turns = [ChatTurn::user("say <|eot_id|> please")];
        let p = Llama3Template.render(&turns).unwrap();
        assert!(p
            .segments()
            .contains(&Segment::Text("say <|eot_id|> please".into())));
        for seg in p.segments() {
            if let Segment::Markup(m) = seg {
                assert!(!m.contains("please"));
            }
        }
    }

    #[test]
    fn malformed_conversations_are_rejected() {
        assert!(matches!(
            Llama3Template.render(&[]),
            Err(SessionError::Template(_))
        ));
        assert!(matches!(
            Llama3Template.render(&[ChatTurn::system("only system")]),
            Err(SessionError::Template(_))
        ));
        assert!(matches!(
            ChatMlTemplate.render(&[ChatTurn::user("a"), ChatTurn::system("late")]),
            Err(SessionError::Template(_))
        ));
    }
}
