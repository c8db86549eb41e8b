pub mod format;
pub mod prompt_format;
pub mod prompting;
pub mod stream_filter;
