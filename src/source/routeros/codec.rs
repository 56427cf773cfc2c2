// RouterOS API sentence framing.
//
// A sentence is a sequence of words terminated by a zero-length word. Each word is
// prefixed by a variable-length length:
//   0x00..=0x7F          1 byte
//   0x80..=0x3FFF        2 bytes, high bits 10
//   0x4000..=0x1FFFFF    3 bytes, high bits 110
//   0x200000..=0xFFFFFFF 4 bytes, high bits 1110
//   larger               0xF0 followed by 4 bytes

use std::collections::HashMap;
use std::io;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Words longer than this are treated as a framing error rather than allocated.
pub const MAX_WORD_LEN: usize = 16 * 1024 * 1024;

pub fn encode_length(len: usize, buf: &mut BytesMut) {
    let len = len as u32;
    if len < 0x80 {
        buf.put_u8(len as u8);
    } else if len < 0x4000 {
        buf.put_u16((len | 0x8000) as u16);
    } else if len < 0x20_0000 {
        let v = len | 0xC0_0000;
        buf.put_u8((v >> 16) as u8);
        buf.put_u16(v as u16);
    } else if len < 0x1000_0000 {
        buf.put_u32(len | 0xE000_0000);
    } else {
        buf.put_u8(0xF0);
        buf.put_u32(len);
    }
}

pub fn encode_word(word: &str, buf: &mut BytesMut) {
    encode_length(word.len(), buf);
    buf.put_slice(word.as_bytes());
}

/// Words followed by the empty terminator word.
pub fn encode_sentence<'a>(words: impl IntoIterator<Item = &'a str>) -> BytesMut {
    let mut buf = BytesMut::new();
    for word in words {
        encode_word(word, &mut buf);
    }
    buf.put_u8(0);
    buf
}

pub async fn read_length<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<usize> {
    let first = r.read_u8().await? as usize;
    let len = if first & 0x80 == 0 {
        first
    } else if first & 0xC0 == 0x80 {
        ((first & 0x3F) << 8) | r.read_u8().await? as usize
    } else if first & 0xE0 == 0xC0 {
        ((first & 0x1F) << 16) | r.read_u16().await? as usize
    } else if first & 0xF0 == 0xE0 {
        let mut rest = [0u8; 3];
        r.read_exact(&mut rest).await?;
        ((first & 0x0F) << 24)
            | ((rest[0] as usize) << 16)
            | ((rest[1] as usize) << 8)
            | rest[2] as usize
    } else if first == 0xF0 {
        r.read_u32().await? as usize
    } else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("reserved length prefix 0x{first:02x}"),
        ));
    };
    Ok(len)
}

pub async fn read_word<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<String> {
    let len = read_length(r).await?;
    if len > MAX_WORD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("word of {len} bytes exceeds limit"),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Read words up to (not including) the terminator.
pub async fn read_sentence<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Vec<String>> {
    let mut words = Vec::new();
    loop {
        let word = read_word(r).await?;
        if word.is_empty() {
            return Ok(words);
        }
        words.push(word);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// One data record.
    Re,
    Done,
    /// `print` matched nothing (RouterOS 7.18+); a `!done` follows.
    Empty,
    /// Command failed; a `!done` follows.
    Trap,
    /// Connection is being closed by the router.
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyKind,
    pub attributes: HashMap<String, String>,
}

impl Reply {
    pub fn message(&self) -> &str {
        self.attributes
            .get("message")
            .map(String::as_str)
            .unwrap_or("no message")
    }
}

/// Classify a reply sentence and split its `=key=value` words.
pub fn parse_reply(words: &[String]) -> io::Result<Reply> {
    let Some((head, rest)) = words.split_first() else {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "empty reply"));
    };
    let kind = match head.as_str() {
        "!re" => ReplyKind::Re,
        "!done" => ReplyKind::Done,
        "!empty" => ReplyKind::Empty,
        "!trap" => ReplyKind::Trap,
        "!fatal" => ReplyKind::Fatal,
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unexpected reply word {other:?}"),
            ));
        }
    };
    let mut attributes = HashMap::with_capacity(rest.len());
    for word in rest {
        if let Some(kv) = word.strip_prefix('=') {
            // value may itself contain '='
            let (key, value) = kv.split_once('=').unwrap_or((kv, ""));
            attributes.insert(key.to_string(), value.to_string());
        } else if kind == ReplyKind::Fatal && !word.starts_with('.') {
            // !fatal carries a bare reason word
            attributes.insert("message".to_string(), word.clone());
        }
    }
    Ok(Reply { kind, attributes })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(len: usize) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_length(len, &mut buf);
        buf.to_vec()
    }

    #[test]
    fn length_prefix_boundaries() {
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(0x7F), vec![0x7F]);
        assert_eq!(encoded(0x80), vec![0x80, 0x80]);
        assert_eq!(encoded(0x3FFF), vec![0xBF, 0xFF]);
        assert_eq!(encoded(0x4000), vec![0xC0, 0x40, 0x00]);
        assert_eq!(encoded(0x1F_FFFF), vec![0xDF, 0xFF, 0xFF]);
        assert_eq!(encoded(0x20_0000), vec![0xE0, 0x20, 0x00, 0x00]);
        assert_eq!(encoded(0x1000_0000), vec![0xF0, 0x10, 0x00, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn read_length_decodes_every_width() {
        for len in [0usize, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, 0x1000_0000] {
            let bytes = encoded(len);
            let mut slice: &[u8] = &bytes;
            assert_eq!(read_length(&mut slice).await.unwrap(), len, "len {len:#x}");
        }
    }

    #[tokio::test]
    async fn sentence_reads_back() {
        let buf = encode_sentence(["/login", "=name=admin", "=password="]);
        let mut slice: &[u8] = &buf;
        let words = read_sentence(&mut slice).await.unwrap();
        assert_eq!(words, vec!["/login", "=name=admin", "=password="]);
        assert!(slice.is_empty());
    }

    #[test]
    fn parse_reply_splits_attributes() {
        let words: Vec<String> = ["!re", "=name=ether1", "=comment=a=b", "=tx-byte=42"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let reply = parse_reply(&words).unwrap();
        assert_eq!(reply.kind, ReplyKind::Re);
        assert_eq!(reply.attributes["name"], "ether1");
        assert_eq!(reply.attributes["comment"], "a=b");
        assert_eq!(reply.attributes["tx-byte"], "42");
    }

    #[test]
    fn parse_reply_knows_empty() {
        let reply = parse_reply(&["!empty".to_string()]).unwrap();
        assert_eq!(reply.kind, ReplyKind::Empty);
        assert!(reply.attributes.is_empty());
    }

    #[test]
    fn parse_reply_rejects_unknown_head() {
        let words = vec!["!bogus".to_string()];
        assert!(parse_reply(&words).is_err());
        assert!(parse_reply(&[]).is_err());
    }
}
