//! The `Stream` type: byte/character sources and sinks behind a common
//! buffered interface.  Streams back the lexer input and the stdio values in
//! the global table.  Stream objects live in the no-move space, so buffer
//! positions cached by the lexer survive collections.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use crate::mem::AllocMode;
use crate::runtime::context::Context;
use crate::strutil;
use crate::value::obj::Body;
use crate::value::repr::Value;
use crate::value::typeobj::{NativeTypeDef, TypeLayout};

const DEFAULT_CHUNK: usize = 4096;

#[derive(Debug)]
pub enum StreamSource {
    /// In-memory bytes; also the sink for capture streams.
    Bytes { data: Vec<u8>, pos: usize },
    File(BufReader<File>),
    Stdin,
    Stdout,
    Stderr,
}

/// Result of peeking or reading one character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharRead {
    Char(u32),
    Eof,
    /// The next bytes are not valid UTF-8.
    Invalid,
}

#[derive(Debug)]
pub struct StreamObj {
    source: StreamSource,
    buf: Vec<u8>,
    pos: usize,
    chunk: usize,
    source_eof: bool,
}

impl StreamObj {
    fn new(source: StreamSource, chunk: usize) -> StreamObj {
        StreamObj { source, buf: Vec::new(), pos: 0, chunk, source_eof: false }
    }

    fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Refill until at least `want` unread bytes are buffered or the source
    /// is exhausted.
    fn ensure(&mut self, want: usize) {
        if self.available() >= want || self.source_eof {
            return;
        }
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        while self.buf.len() < want.max(1) && !self.source_eof {
            let mut chunk = vec![0u8; self.chunk];
            let n = match &mut self.source {
                StreamSource::Bytes { data, pos } => {
                    let n = (data.len() - *pos).min(self.chunk);
                    chunk[..n].copy_from_slice(&data[*pos..*pos + n]);
                    *pos += n;
                    n
                }
                StreamSource::File(reader) => reader.read(&mut chunk).unwrap_or(0),
                StreamSource::Stdin => io::stdin().read(&mut chunk).unwrap_or(0),
                StreamSource::Stdout | StreamSource::Stderr => 0,
            };
            if n == 0 {
                self.source_eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
    }

    fn peek_char(&mut self) -> CharRead {
        self.ensure(4);
        let rest = &self.buf[self.pos..];
        if rest.is_empty() {
            return CharRead::Eof;
        }
        match strutil::u8char_to_code(rest) {
            Some((c, _)) => CharRead::Char(c),
            None => CharRead::Invalid,
        }
    }

    fn read_char(&mut self) -> CharRead {
        self.ensure(4);
        let rest = &self.buf[self.pos..];
        if rest.is_empty() {
            return CharRead::Eof;
        }
        match strutil::u8char_to_code(rest) {
            Some((c, n)) => {
                self.pos += n;
                CharRead::Char(c)
            }
            None => CharRead::Invalid,
        }
    }
}

/* ----- constructors --------------------------------------------------------- */

pub fn new_bytes(z: &mut Context, data: Vec<u8>) -> Value {
    z.alloc(
        AllocMode::NoMove,
        Body::Stream(StreamObj::new(StreamSource::Bytes { data, pos: 0 }, DEFAULT_CHUNK)),
    )
}

/// Like `new_bytes`, with a caller-chosen refill chunk size.  Small chunks
/// exercise the buffer-boundary paths of the lexer.
pub fn new_bytes_chunked(z: &mut Context, data: Vec<u8>, chunk: usize) -> Value {
    z.alloc(
        AllocMode::NoMove,
        Body::Stream(StreamObj::new(StreamSource::Bytes { data, pos: 0 }, chunk.max(1))),
    )
}

pub fn open_file(z: &mut Context, path: &Path) -> io::Result<Value> {
    let file = File::open(path)?;
    Ok(z.alloc(
        AllocMode::NoMove,
        Body::Stream(StreamObj::new(StreamSource::File(BufReader::new(file)), DEFAULT_CHUNK)),
    ))
}

pub fn new_stdin(z: &mut Context) -> Value {
    z.alloc(AllocMode::NoMove, Body::Stream(StreamObj::new(StreamSource::Stdin, DEFAULT_CHUNK)))
}

pub fn new_stdout(z: &mut Context) -> Value {
    z.alloc(AllocMode::NoMove, Body::Stream(StreamObj::new(StreamSource::Stdout, DEFAULT_CHUNK)))
}

pub fn new_stderr(z: &mut Context) -> Value {
    z.alloc(AllocMode::NoMove, Body::Stream(StreamObj::new(StreamSource::Stderr, DEFAULT_CHUNK)))
}

/* ----- character input ------------------------------------------------------- */

fn get_mut(z: &mut Context, v: Value) -> &mut StreamObj {
    match &mut z.mem.obj_mut(v).body {
        Body::Stream(s) => s,
        other => panic!("expected a Stream, found {}", other.type_name()),
    }
}

pub fn is_stream(z: &Context, v: Value) -> bool {
    v.is_object() && matches!(z.mem.obj(v).body, Body::Stream(_))
}

/// Peek the next character without consuming it.
pub fn peek_char(z: &mut Context, v: Value) -> CharRead {
    get_mut(z, v).peek_char()
}

/// Read and consume the next character.
pub fn read_char(z: &mut Context, v: Value) -> CharRead {
    get_mut(z, v).read_char()
}

/// Consume the next byte, which must be a buffered 1-byte character.
pub fn skip_byte(z: &mut Context, v: Value) {
    let s = get_mut(z, v);
    debug_assert!(s.available() >= 1 && s.buf[s.pos] < 0x80);
    s.pos += 1;
}

/// Look at the unread remainder of the buffer, refilled to at least `min`
/// bytes when the source allows.  The second closure argument reports
/// whether the source is exhausted past the slice.
pub fn with_buffer<R>(z: &mut Context, v: Value, min: usize, f: impl FnOnce(&[u8], bool) -> R) -> R {
    let s = get_mut(z, v);
    s.ensure(min);
    let eof = s.source_eof;
    f(&s.buf[s.pos..], eof)
}

/// Consume `n` buffered bytes.
pub fn consume(z: &mut Context, v: Value, n: usize) {
    let s = get_mut(z, v);
    debug_assert!(n <= s.available());
    s.pos += n;
}

/* ----- output ---------------------------------------------------------------- */

pub fn write_bytes(z: &mut Context, v: Value, bytes: &[u8]) -> io::Result<()> {
    match &mut get_mut(z, v).source {
        StreamSource::Bytes { data, .. } => {
            data.extend_from_slice(bytes);
            Ok(())
        }
        StreamSource::File(_) | StreamSource::Stdin => {
            Err(io::Error::new(io::ErrorKind::Unsupported, "stream is read-only"))
        }
        StreamSource::Stdout => io::stdout().write_all(bytes),
        StreamSource::Stderr => io::stderr().write_all(bytes),
    }
}

pub fn write_str(z: &mut Context, v: Value, text: &str) -> io::Result<()> {
    write_bytes(z, v, text.as_bytes())
}

pub fn flush(z: &mut Context, v: Value) -> io::Result<()> {
    match &mut get_mut(z, v).source {
        StreamSource::Stdout => io::stdout().flush(),
        StreamSource::Stderr => io::stderr().flush(),
        _ => Ok(()),
    }
}

pub(crate) static TYPE_DEF: NativeTypeDef = NativeTypeDef {
    name: "Stream",
    fields: &[],
    layout: TypeLayout::BytesExtended,
    methods: &[],
    statics: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_reads_match_bulk_decode() {
        let mut z = Context::for_tests();
        let text = "aß\u{0100}\u{10000}z";
        let v = new_bytes_chunked(&mut z, text.as_bytes().to_vec(), 2);
        let mut got = Vec::new();
        loop {
            let peeked = peek_char(&mut z, v);
            match read_char(&mut z, v) {
                CharRead::Char(c) => {
                    assert_eq!(peeked, CharRead::Char(c));
                    got.push(char::from_u32(c).unwrap());
                }
                CharRead::Eof => break,
                CharRead::Invalid => panic!("unexpected invalid input"),
            }
        }
        assert_eq!(got.into_iter().collect::<String>(), text);
    }

    #[test]
    fn buffer_view_and_consume_agree_with_reads() {
        let mut z = Context::for_tests();
        let v = new_bytes_chunked(&mut z, b"hello world".to_vec(), 4);
        let first = with_buffer(&mut z, v, 4, |buf, _| buf[..4].to_vec());
        assert_eq!(&first, b"hell");
        consume(&mut z, v, 4);
        assert_eq!(read_char(&mut z, v), CharRead::Char('o' as u32));
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let mut z = Context::for_tests();
        let v = new_bytes(&mut z, vec![b'a', 0xff]);
        assert_eq!(read_char(&mut z, v), CharRead::Char('a' as u32));
        assert_eq!(read_char(&mut z, v), CharRead::Invalid);
    }
}
