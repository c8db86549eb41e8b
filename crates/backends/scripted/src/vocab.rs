use parley_abi::{EngineError, Token};

/// Control tokens of the default vocabulary, in id order starting at 256.
pub const DEFAULT_CONTROL_TOKENS: &[&str] = &[
    "<|begin_of_text|>",
    "<|end_of_text|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
    "<|eot_id|>",
    "<|im_start|>",
    "<|im_end|>",
];

const BYTE_TOKENS: i32 = 256;

/// Byte-level vocabulary with a fixed table of control tokens after the bytes.
#[derive(Debug, Clone)]
pub struct ScriptedVocab {
    controls: Vec<String>,
    bos: Token,
    eos: Token,
}

impl ScriptedVocab {
    /// Build a vocabulary; `bos`/`eos` name entries of `controls`.
    ///
    /// Returns `None` if either is missing from the table.
    pub fn new<I, S>(controls: I, bos: &str, eos: &str) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let controls: Vec<String> = controls.into_iter().map(Into::into).collect();
        let find = |s: &str| {
            controls
                .iter()
                .position(|c| c == s)
                .map(|i| Token(BYTE_TOKENS + i as i32))
        };
        let bos = find(bos)?;
        let eos = find(eos)?;
        Some(Self { controls, bos, eos })
    }

    pub fn len(&self) -> usize {
        BYTE_TOKENS as usize + self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn bos(&self) -> Token {
        self.bos
    }

    pub fn eos(&self) -> Token {
        self.eos
    }

    /// Id of a control token by its text.
    pub fn control(&self, text: &str) -> Option<Token> {
        self.controls
            .iter()
            .position(|c| c == text)
            .map(|i| Token(BYTE_TOKENS + i as i32))
    }

    pub fn contains(&self, token: Token) -> bool {
        token.0 >= 0 && (token.0 as usize) < self.len()
    }

    pub fn tokenize(&self, text: &str, add_special: bool, parse_special: bool) -> Vec<Token> {
        let bytes = text.as_bytes();
        let mut out = Vec::with_capacity(bytes.len() + 1);
        if add_special {
            out.push(self.bos);
        }
        let mut i = 0;
        while i < bytes.len() {
            if parse_special {
                if let Some((id, len)) = self.control_at(&bytes[i..]) {
                    out.push(id);
                    i += len;
                    continue;
                }
            }
            out.push(Token(bytes[i] as i32));
            i += 1;
        }
        out
    }

    pub fn piece(&self, token: Token) -> Result<Vec<u8>, EngineError> {
        match token.0 {
            id @ 0..=255 => Ok(vec![id as u8]),
            id if self.contains(token) => {
                Ok(self.controls[(id - BYTE_TOKENS) as usize].as_bytes().to_vec())
            }
            id => Err(EngineError::Detokenize {
                token: id,
                reason: "id outside vocabulary".into(),
            }),
        }
    }

    // Longest control token starting at the head of `bytes`.
    fn control_at(&self, bytes: &[u8]) -> Option<(Token, usize)> {
        self.controls
            .iter()
            .enumerate()
            .filter(|(_, c)| bytes.starts_with(c.as_bytes()))
            .max_by_key(|(_, c)| c.len())
            .map(|(i, c)| (Token(BYTE_TOKENS + i as i32), c.len()))
    }
}

impl Default for ScriptedVocab {
    fn default() -> Self {
        Self {
            controls: DEFAULT_CONTROL_TOKENS.iter().map(|s| s.to_string()).collect(),
            bos: Token(BYTE_TOKENS),
            eos: Token(BYTE_TOKENS + 1),
        }
    }
}
