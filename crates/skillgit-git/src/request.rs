//! Decoding of `git-upload-pack` request bodies.
//!
//! The parser is lenient: it never fails, and stops at the first packet it
//! cannot make sense of, returning whatever it decoded up to that point.
//! `UploadPackRequest::truncated` records that an early stop happened.

use crate::object::ObjectId;

/// What a client asked for in an upload-pack request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPackRequest {
    /// Lowercase ids from `want` lines, in request order.
    pub wants: Vec<String>,
    /// Lowercase ids from `have` lines.
    pub haves: Vec<String>,
    /// Ids the client already has as shallow boundaries.
    pub shallows: Vec<String>,
    /// Depth from a `deepen` line.
    pub depth: Option<u32>,
    /// Whether the client sent `done`.
    pub done: bool,
    /// Whether parsing stopped on malformed input before the end of the body.
    pub truncated: bool,
}

impl UploadPackRequest {
    /// True when the client asked for a depth-limited history.
    pub fn is_shallow(&self) -> bool {
        self.depth.is_some_and(|d| d > 0)
    }
}

/// Decodes an upload-pack request body.
///
/// A data packet whose declared length runs past the end of the body is
/// cut short to what remains, so a trailing `0009done` without its newline
/// still counts as `done`.
pub fn parse_upload_pack_request(body: &[u8]) -> UploadPackRequest {
    let mut request = UploadPackRequest::default();
    let mut pos = 0;

    while pos < body.len() {
        let Some(len) = body.get(pos..pos + 4).and_then(parse_length) else {
            request.truncated = true;
            break;
        };
        pos += 4;

        match len {
            // flush, delimiter, response-end
            0..=2 => continue,
            3 => {
                request.truncated = true;
                break;
            }
            _ => {}
        }

        let end = (pos + len - 4).min(body.len());
        let line = &body[pos..end];
        pos = end;

        if !apply_line(&mut request, line) {
            request.truncated = true;
            break;
        }
    }

    if request.truncated {
        tracing::trace!(parsed = pos, total = body.len(), "upload-pack request truncated");
    }

    request
}

fn parse_length(prefix: &[u8]) -> Option<usize> {
    if !prefix.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let prefix = std::str::from_utf8(prefix).ok()?;
    usize::from_str_radix(prefix, 16).ok()
}

/// Records one command line; returns false when the line is malformed.
fn apply_line(request: &mut UploadPackRequest, line: &[u8]) -> bool {
    let Ok(line) = std::str::from_utf8(line) else {
        return false;
    };
    let line = line.trim_end_matches('\n');

    let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "want" => push_id(&mut request.wants, arg),
        "have" => push_id(&mut request.haves, arg),
        "shallow" => push_id(&mut request.shallows, arg),
        "deepen" => match arg.trim().parse::<u32>() {
            Ok(depth) => {
                request.depth = Some(depth);
                true
            }
            Err(_) => false,
        },
        "done" => {
            request.done = true;
            true
        }
        // Capabilities, filters and other well-formed commands are ignored
        _ => true,
    }
}

fn push_id(ids: &mut Vec<String>, arg: &str) -> bool {
    // `want` lines may carry capabilities after the id
    let sha = arg.split(' ').next().unwrap_or_default();
    match ObjectId::from_hex(sha) {
        Ok(id) => {
            ids.push(id.to_hex());
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "0123456789abcdef0123456789abcdef01234567";
    const OTHER: &str = "89abcdef0123456789abcdef0123456789abcdef";

    fn pkt(s: &str) -> String {
        format!("{:04x}{}", s.len() + 4, s)
    }

    #[test]
    fn test_parse_want_flush_done() {
        let body = format!("0032want {}\n00000009done", SHA);
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.wants, vec![SHA.to_string()]);
        assert!(request.done);
        assert!(!request.truncated);
        assert!(!request.is_shallow());
    }

    #[test]
    fn test_parse_done_with_newline() {
        let body = format!("{}0000{}", pkt(&format!("want {}\n", SHA)), pkt("done\n"));
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.wants.len(), 1);
        assert!(request.done);
    }

    #[test]
    fn test_parse_want_with_capabilities() {
        let body = format!(
            "{}{}0000{}",
            pkt(&format!(
                "want {} multi_ack_detailed side-band-64k thin-pack ofs-delta agent=git/2.43.0\n",
                SHA
            )),
            pkt(&format!("want {}\n", OTHER)),
            pkt("done\n"),
        );
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.wants, vec![SHA.to_string(), OTHER.to_string()]);
        assert!(request.done);
    }

    #[test]
    fn test_parse_haves() {
        let body = format!(
            "{}0000{}{}",
            pkt(&format!("want {}\n", SHA)),
            pkt(&format!("have {}\n", OTHER)),
            pkt("done\n"),
        );
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.haves, vec![OTHER.to_string()]);
    }

    #[test]
    fn test_parse_shallow_clone() {
        let body = format!(
            "{}{}{}0000{}",
            pkt(&format!("want {}\n", SHA)),
            pkt(&format!("shallow {}\n", OTHER)),
            pkt("deepen 1\n"),
            pkt("done\n"),
        );
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.depth, Some(1));
        assert_eq!(request.shallows, vec![OTHER.to_string()]);
        assert!(request.is_shallow());
    }

    #[test]
    fn test_deepen_zero_is_not_shallow() {
        let request = parse_upload_pack_request(pkt("deepen 0\n").as_bytes());
        assert_eq!(request.depth, Some(0));
        assert!(!request.is_shallow());
    }

    #[test]
    fn test_uppercase_ids_are_lowered() {
        let body = pkt(&format!("want {}\n", SHA.to_uppercase()));
        let request = parse_upload_pack_request(body.as_bytes());
        assert_eq!(request.wants, vec![SHA.to_string()]);
    }

    #[test]
    fn test_unknown_commands_are_skipped() {
        let body = format!(
            "{}{}{}",
            pkt("filter blob:none\n"),
            pkt(&format!("want {}\n", SHA)),
            pkt("done\n"),
        );
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.wants.len(), 1);
        assert!(request.done);
        assert!(!request.truncated);
    }

    #[test]
    fn test_malformed_sha_stops_parsing() {
        let body = format!(
            "{}{}{}",
            pkt(&format!("want {}\n", SHA)),
            pkt("want nothex\n"),
            pkt(&format!("want {}\n", OTHER)),
        );
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.wants, vec![SHA.to_string()]);
        assert!(request.truncated);
    }

    #[test]
    fn test_garbage_prefix_stops_parsing() {
        let body = format!("{}zzzz{}", pkt(&format!("want {}\n", SHA)), pkt("done\n"));
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.wants.len(), 1);
        assert!(!request.done);
        assert!(request.truncated);
    }

    #[test]
    fn test_empty_and_short_bodies() {
        assert_eq!(parse_upload_pack_request(b""), UploadPackRequest::default());

        let request = parse_upload_pack_request(b"00");
        assert!(request.wants.is_empty());
        assert!(request.truncated);

        let request = parse_upload_pack_request(b"0003");
        assert!(request.truncated);
    }

    #[test]
    fn test_bad_deepen_stops_parsing() {
        let body = format!("{}{}", pkt("deepen many\n"), pkt("done\n"));
        let request = parse_upload_pack_request(body.as_bytes());

        assert_eq!(request.depth, None);
        assert!(!request.done);
        assert!(request.truncated);
    }
}
