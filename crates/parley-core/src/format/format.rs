//! Rendered prompt carrier passed from a chat template to the generation loop.
//!
//! A prompt is a sequence of segments. `Markup` segments are template
//! structure and are tokenized with control-token parsing enabled; `Text`
//! segments are conversation content and are tokenized with it disabled, so
//! content that happens to spell `<|eot_id|>` stays ordinary text.

use parley_abi::{EngineError, InferenceEngine, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Markup(String),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormattedPrompt {
    segments: Vec<Segment>,
}

impl FormattedPrompt {
    /// A prompt built from pre-rendered text; markup inside it is honoured.
    pub fn new<T: Into<String>>(text: T) -> Self {
        let mut p = Self::default();
        p.push_markup(text);
        p
    }

    pub fn push_markup<T: Into<String>>(&mut self, s: T) -> &mut Self {
        let s = s.into();
        if s.is_empty() {
            return self;
        }
        match self.segments.last_mut() {
            Some(Segment::Markup(prev)) => prev.push_str(&s),
            _ => self.segments.push(Segment::Markup(s)),
        }
        self
    }

    pub fn push_text<T: Into<String>>(&mut self, s: T) -> &mut Self {
        let s = s.into();
        if s.is_empty() {
            return self;
        }
        match self.segments.last_mut() {
            Some(Segment::Text(prev)) => prev.push_str(&s),
            _ => self.segments.push(Segment::Text(s)),
        }
        self
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Flat rendering, for logs and golden tests.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Markup(m) => m.as_str(),
                Segment::Text(t) => t.as_str(),
            })
            .collect()
    }

    /// Tokenize segment by segment. No BOS is added: templates that want one
    /// spell it out as markup.
    pub fn tokenize<E: InferenceEngine + ?Sized>(
        &self,
        engine: &E,
    ) -> Result<Vec<Token>, EngineError> {
        let mut out = Vec::new();
        for seg in &self.segments {
            let toks = match seg {
                Segment::Markup(m) => engine.tokenize(m, false, true)?,
                Segment::Text(t) => engine.tokenize(t, false, false)?,
            };
            out.extend(toks);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_segments_of_one_kind_merge() {
        let mut p = FormattedPrompt::default();
        p.push_markup("<a>").push_markup("<b>").push_text("x").push_text("").push_text("y");
        assert_eq!(
            p.segments(),
            &[Segment::Markup("<a><b>".into()), Segment::Text("xy".into())]
        );
        assert_eq!(p.text(), "<a><b>xy");
    }
}
