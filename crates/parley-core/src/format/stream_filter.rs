//! Streaming removal of template control markers from generated text.
//!
//! Fragments arrive in token-sized pieces that need not line up with marker
//! boundaries. The filter holds back the shortest tail that could still grow
//! into a marker and emits everything before it. Removal is a single
//! left-to-right pass in which the longest complete marker at a position
//! wins; the streamed output equals that pass over the whole text.

#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    markers: Vec<String>,
    pending: String,
}

impl StreamFilter {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let markers = markers
            .into_iter()
            .map(Into::into)
            .filter(|m: &String| !m.is_empty())
            .collect();
        Self {
            markers,
            pending: String::new(),
        }
    }

    /// Feed one fragment; returns the text that is safe to emit now.
    pub fn push(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        self.drain(false)
    }

    /// End of stream: flush whatever is held, minus complete markers.
    pub fn finish(&mut self) -> String {
        self.drain(true)
    }

    /// Text currently held back as a possible marker prefix.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Filter a complete text in one go.
    pub fn strip(&self, text: &str) -> String {
        let mut f = Self {
            markers: self.markers.clone(),
            pending: text.to_string(),
        };
        f.drain(true)
    }

    fn longest_match(&self, rest: &str) -> Option<usize> {
        self.markers
            .iter()
            .filter(|m| rest.starts_with(m.as_str()))
            .map(String::len)
            .max()
    }

    fn could_grow(&self, rest: &str) -> bool {
        self.markers
            .iter()
            .any(|m| m.len() > rest.len() && m.starts_with(rest))
    }

    fn drain(&mut self, at_end: bool) -> String {
        let buf = std::mem::take(&mut self.pending);
        let mut out = String::with_capacity(buf.len());
        let mut from = 0;
        let mut i = 0;

        while i < buf.len() {
            let rest = &buf[i..];
            if !at_end && self.could_grow(rest) {
                out.push_str(&buf[from..i]);
                self.pending = rest.to_string();
                return out;
            }
            if let Some(len) = self.longest_match(rest) {
                out.push_str(&buf[from..i]);
                i += len;
                from = i;
                continue;
            }
            i += rest.chars().next().map_or(1, char::len_utf8);
        }

        out.push_str(&buf[from..]);
        out
    }
}
