/// Decode as much of `staging` as can be decided now and drain it.
///
/// Invalid sequences become U+FFFD and decoding carries on past them; a
/// trailing incomplete code point stays in `staging` for the next piece.
pub(super) fn drain_utf8(staging: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut consumed = 0;
    loop {
        let rest = &staging[consumed..];
        match std::str::from_utf8(rest) {
            Ok(s) => {
                out.push_str(s);
                consumed = staging.len();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                // the prefix is valid, so nothing is replaced here
                out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        consumed += valid + bad;
                    }
                    None => {
                        consumed += valid;
                        break;
                    }
                }
            }
        }
    }
    staging.drain(..consumed);
    out
}
