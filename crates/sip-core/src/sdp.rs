//! SDP compatibility patch
//!
//! Some PBXs (FreeSWITCH in particular) leave `a=mid` and the media direction
//! implicit. WebRTC stacks insist on both, so every media section of a remote
//! description is completed before it reaches the media engine.

use tracing::warn;

const DIRECTIONS: [&str; 4] = ["sendrecv", "sendonly", "recvonly", "inactive"];

#[derive(Debug, PartialEq, Eq)]
struct SdpParseError(String);

/// A session description split into its session-level lines and media sections
#[derive(Debug)]
struct SessionDescription<'a> {
    session: Vec<&'a str>,
    media: Vec<Vec<&'a str>>,
}

impl<'a> SessionDescription<'a> {
    fn parse(input: &'a str) -> Result<Self, SdpParseError> {
        let mut session = Vec::new();
        let mut media: Vec<Vec<&str>> = Vec::new();

        for (index, line) in input.lines().filter(|l| !l.is_empty()).enumerate() {
            let bytes = line.as_bytes();
            if bytes.len() < 2 || bytes[1] != b'=' || !bytes[0].is_ascii_lowercase() {
                return Err(SdpParseError(format!("invalid line {}: {line:?}", index + 1)));
            }
            if index == 0 && bytes[0] != b'v' {
                return Err(SdpParseError("description must start with v=".into()));
            }
            if bytes[0] == b'm' {
                media.push(vec![line]);
            } else if let Some(section) = media.last_mut() {
                section.push(line);
            } else {
                session.push(line);
            }
        }

        if session.is_empty() {
            return Err(SdpParseError("empty description".into()));
        }
        Ok(Self { session, media })
    }

    fn marshal(&self, extra: &[Vec<&str>]) -> String {
        let mut out = String::new();
        for line in &self.session {
            out.push_str(line);
            out.push_str("\r\n");
        }
        for (section, added) in self.media.iter().zip(extra) {
            for line in section.iter().chain(added.iter()) {
                out.push_str(line);
                out.push_str("\r\n");
            }
        }
        out
    }
}

fn attribute_name(line: &str) -> Option<&str> {
    let attr = line.strip_prefix("a=")?;
    Some(attr.split_once(':').map_or(attr, |(name, _)| name))
}

/// Make sure every media section declares `a=mid` and a direction.
///
/// Sections missing `mid` get `a=mid:0`, sections without any direction
/// attribute get `a=sendrecv`. Input that does not parse as SDP is returned
/// unchanged.
pub fn patch_sdp(input: &str) -> String {
    let parsed = match SessionDescription::parse(input) {
        Ok(parsed) => parsed,
        Err(SdpParseError(reason)) => {
            warn!("Leaving SDP unpatched, parse failed: {}", reason);
            return input.to_string();
        }
    };

    let additions: Vec<Vec<&str>> = parsed
        .media
        .iter()
        .map(|section| {
            let names: Vec<&str> = section.iter().filter_map(|l| attribute_name(l)).collect();
            let mut added = Vec::new();
            if !names.contains(&"mid") {
                added.push("a=mid:0");
            }
            if !names.iter().any(|name| DIRECTIONS.contains(name)) {
                added.push("a=sendrecv");
            }
            added
        })
        .collect();

    parsed.marshal(&additions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_BARE_SECTIONS: &str = "v=0\r\n\
o=FreeSWITCH 1 2 IN IP4 10.0.0.1\r\n\
s=FreeSWITCH\r\n\
c=IN IP4 10.0.0.1\r\n\
t=0 0\r\n\
m=audio 20000 UDP/TLS/RTP/SAVPF 111\r\n\
a=rtpmap:111 opus/48000/2\r\n\
m=video 20002 UDP/TLS/RTP/SAVPF 96\r\n\
a=rtpmap:96 VP8/90000\r\n";

    #[test]
    fn injects_mid_and_sendrecv_into_each_section() {
        let patched = patch_sdp(TWO_BARE_SECTIONS);
        let audio = patched.find("m=audio").unwrap();
        let video = patched.find("m=video").unwrap();

        let audio_section = &patched[audio..video];
        assert!(audio_section.contains("a=mid:0\r\n"));
        assert!(audio_section.contains("a=sendrecv\r\n"));

        let video_section = &patched[video..];
        assert!(video_section.contains("a=mid:0\r\n"));
        assert!(video_section.contains("a=sendrecv\r\n"));
        assert!(patched.starts_with("v=0\r\n"));
    }

    #[test]
    fn leaves_complete_section_unchanged() {
        let input = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=mid:audio\r\na=recvonly\r\n";
        assert_eq!(patch_sdp(input), input);
    }

    #[test]
    fn session_level_direction_does_not_count() {
        let input = "v=0\r\ns=-\r\na=sendrecv\r\nm=audio 9 RTP/AVP 0\r\na=mid:1\r\n";
        let patched = patch_sdp(input);
        assert!(patched.ends_with("m=audio 9 RTP/AVP 0\r\na=mid:1\r\na=sendrecv\r\n"));
    }

    #[test]
    fn unparsable_input_is_returned_unchanged() {
        assert_eq!(patch_sdp("not sdp at all"), "not sdp at all");
        assert_eq!(patch_sdp(""), "");
        assert_eq!(patch_sdp("s=-\r\nv=0\r\n"), "s=-\r\nv=0\r\n");
    }

    #[test]
    fn lf_only_input_is_normalised_to_crlf() {
        let patched = patch_sdp("v=0\ns=-\nm=audio 9 RTP/AVP 0\n");
        assert_eq!(patched, "v=0\r\ns=-\r\nm=audio 9 RTP/AVP 0\r\na=mid:0\r\na=sendrecv\r\n");
    }
}
