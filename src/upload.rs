//! Upload pipeline: content type, compression and header preparation.

use std::{
    fmt, fs,
    io::{self, Cursor, Read, Seek, Write},
    pin::Pin,
    task::{Context, Poll},
};

use bytes::Bytes;
use flate2::{write::GzEncoder, Compression};
use futures::Stream;
use http::{header, HeaderMap, HeaderName, HeaderValue};
use mime::Mime;
use tempfile::SpooledTempFile;

use crate::{
    config::StorageConfig,
    error::{BucketError, StorageError},
};

/// Size past which temporary buffers spill from memory to disk.
pub const SPOOL_THRESHOLD: usize = 10 * 1024 * 1024;
/// `Content-Encoding` value for gzip-compressed objects.
pub const CONTENT_ENCODING_GZIP: &str = "gzip";

const CHUNK_SIZE: usize = 64 * 1024;
const COMPRESSIBLE_SUBTYPES: [&str; 4] = ["xml", "json", "html", "javascript"];

/// Seekable byte source accepted by [`Content::binary`].
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

type TextChunks = dyn Iterator<Item = io::Result<String>> + Send;

/// File content handed to `save`.
pub enum Content {
    /// Raw bytes from a seekable reader. Rewound before upload.
    Binary(Box<dyn ReadSeek>),
    /// Character data, encoded as UTF-8 into a temporary buffer before upload.
    Text(Box<TextChunks>),
}

impl Content {
    /// Wraps a seekable byte reader.
    pub fn binary<R: ReadSeek + 'static>(reader: R) -> Self {
        Self::Binary(Box::new(reader))
    }

    /// Wraps an in-memory byte payload.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::binary(Cursor::new(data.into()))
    }

    /// Wraps an open file.
    pub fn file(file: fs::File) -> Self {
        Self::binary(file)
    }

    /// Wraps a single string.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(Box::new(std::iter::once(Ok(text.into()))))
    }

    /// Wraps a sequence of string chunks.
    pub fn text_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = String>,
        I::IntoIter: Send + 'static,
    {
        Self::Text(Box::new(chunks.into_iter().map(Ok)))
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Binary(_) => f.write_str("Binary(<reader>)"),
            Self::Text(_) => f.write_str("Text(<chunks>)"),
        }
    }
}

/// Prepared upload body, readable once from the start.
pub struct UploadBody {
    reader: Box<dyn ReadSeek>,
    len: u64,
    finished: bool,
}

impl UploadBody {
    fn new(reader: Box<dyn ReadSeek>, len: u64) -> Self {
        Self {
            reader,
            len,
            finished: false,
        }
    }

    /// Returns the body size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` for an empty body.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for UploadBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadBody")
            .field("len", &self.len)
            .field("finished", &self.finished)
            .finish()
    }
}

impl Read for UploadBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Stream for UploadBody {
    type Item = Result<Bytes, BucketError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            match this.reader.read(&mut chunk) {
                Ok(0) => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Ok(read) => {
                    chunk.truncate(read);
                    return Poll::Ready(Some(Ok(Bytes::from(chunk))));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err.into())));
                }
            }
        }
    }
}

/// Upload-ready body plus the headers to store with it.
#[derive(Debug)]
pub struct UploadEnvelope {
    /// Final (possibly compressed) body.
    pub body: UploadBody,
    /// Content type inferred from the file name.
    pub content_type: Mime,
    /// Applied content encoding, if the body was compressed.
    pub content_encoding: Option<&'static str>,
    /// Headers to write with the object.
    pub headers: HeaderMap,
}

/// Creates a temporary buffer that spills to disk past [`SPOOL_THRESHOLD`].
pub(crate) fn temporary_buffer() -> SpooledTempFile {
    tempfile::spooled_tempfile(SPOOL_THRESHOLD)
}

/// Infers the content type of `name` from its extension.
pub fn content_type_for(name: &str) -> Mime {
    mime_guess::from_path(name).first_or_octet_stream()
}

/// Returns `gzip` for content types worth compressing.
///
/// That covers `text/*` and the `xml`, `json`, `html` and `javascript`
/// subtypes, including structured suffixes such as `application/ld+json`.
pub fn candidate_encoding(content_type: &Mime) -> Option<&'static str> {
    let subtype = content_type
        .suffix()
        .unwrap_or_else(|| content_type.subtype());

    let compressible = content_type.type_().as_str().eq_ignore_ascii_case("text")
        || COMPRESSIBLE_SUBTYPES
            .iter()
            .any(|candidate| subtype.as_str().eq_ignore_ascii_case(candidate));

    compressible.then_some(CONTENT_ENCODING_GZIP)
}

/// Runs the upload pipeline for `name`.
///
/// The content is rewound, text is encoded into a byte buffer, and
/// compressible types are gzipped when enabled and strictly smaller.
pub fn prepare_upload(
    name: &str,
    content: Content,
    config: &StorageConfig,
) -> Result<UploadEnvelope, StorageError> {
    let content_type = content_type_for(name);
    let candidate = candidate_encoding(&content_type);

    let mut source = into_byte_source(content)?;
    let original_len = source.seek(io::SeekFrom::End(0))?;
    source.rewind()?;

    let (body, len, content_encoding) = match candidate {
        Some(encoding) if config.gzip => compress_if_smaller(source, original_len, encoding)?,
        _ => (source, original_len, None),
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header_value(header::CONTENT_TYPE.as_str(), content_type.as_ref())?,
    );
    headers.insert(
        header::CACHE_CONTROL,
        header_value(header::CACHE_CONTROL.as_str(), &config.cache_control())?,
    );
    if let Some(encoding) = content_encoding {
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding));
    }
    apply_metadata(&mut headers, name, config)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        name = name,
        content_type = content_type.essence_str(),
        content_encoding = content_encoding.unwrap_or("<none>"),
        original_size = original_len,
        stored_size = len,
        "upload: prepared body"
    );

    Ok(UploadEnvelope {
        body: UploadBody::new(body, len),
        content_type,
        content_encoding,
        headers,
    })
}

/// Inserts the configured metadata headers, evaluated for `name`.
pub(crate) fn apply_metadata(
    headers: &mut HeaderMap,
    name: &str,
    config: &StorageConfig,
) -> Result<(), StorageError> {
    for (key, value) in &config.metadata {
        let header_name =
            HeaderName::from_bytes(key.as_bytes()).map_err(|_| StorageError::InvalidHeader {
                header: key.clone(),
            })?;
        headers.insert(header_name, header_value(key, &value.resolve(name))?);
    }
    Ok(())
}

pub(crate) fn header_value(header: &str, value: &str) -> Result<HeaderValue, StorageError> {
    HeaderValue::from_str(value).map_err(|_| StorageError::InvalidHeader {
        header: header.to_owned(),
    })
}

fn into_byte_source(content: Content) -> io::Result<Box<dyn ReadSeek>> {
    match content {
        Content::Binary(mut reader) => {
            reader.rewind()?;
            Ok(reader)
        }
        Content::Text(chunks) => {
            let mut buffer = temporary_buffer();
            for chunk in chunks {
                buffer.write_all(chunk?.as_bytes())?;
            }
            buffer.rewind()?;
            Ok(Box::new(buffer))
        }
    }
}

fn compress_if_smaller(
    mut source: Box<dyn ReadSeek>,
    original_len: u64,
    encoding: &'static str,
) -> io::Result<(Box<dyn ReadSeek>, u64, Option<&'static str>)> {
    let mut encoder = GzEncoder::new(temporary_buffer(), Compression::best());
    io::copy(&mut source, &mut encoder)?;
    let mut compressed = encoder.finish()?;
    let compressed_len = compressed.stream_position()?;

    if compressed_len < original_len {
        compressed.rewind()?;
        return Ok((Box::new(compressed), compressed_len, Some(encoding)));
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        original_size = original_len,
        compressed_size = compressed_len,
        "upload: gzip output not smaller, keeping original"
    );

    source.rewind()?;
    Ok((source, original_len, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_content_type_from_extension() {
        assert_eq!(content_type_for("site.css").essence_str(), "text/css");
        assert_eq!(content_type_for("data.json").essence_str(), "application/json");
        assert_eq!(content_type_for("photo.PNG").essence_str(), "image/png");
        assert_eq!(
            content_type_for("no-extension").essence_str(),
            "application/octet-stream"
        );
    }

    #[test]
    fn compressible_families_get_gzip_candidate() {
        for content_type in [
            "text/plain",
            "text/css",
            "application/json",
            "application/ld+json",
            "image/svg+xml",
            "application/javascript",
            "application/xhtml+html",
        ] {
            let mime: Mime = content_type.parse().unwrap();
            assert_eq!(candidate_encoding(&mime), Some("gzip"), "{content_type}");
        }

        for content_type in ["image/png", "application/octet-stream", "application/pdf"] {
            let mime: Mime = content_type.parse().unwrap();
            assert_eq!(candidate_encoding(&mime), None, "{content_type}");
        }
    }

    #[test]
    fn text_content_is_encoded_as_utf8() {
        let config = StorageConfig {
            gzip: false,
            ..StorageConfig::media()
        };
        let chunks = vec!["h\u{e9}llo ".to_owned(), "w\u{f6}rld".to_owned()];
        let mut envelope = prepare_upload("greeting.txt", Content::text_chunks(chunks), &config)
            .unwrap();

        let mut body = Vec::new();
        envelope.body.read_to_end(&mut body).unwrap();
        assert_eq!(body, "h\u{e9}llo w\u{f6}rld".as_bytes());
        assert_eq!(envelope.content_encoding, None);
    }

    #[test]
    fn binary_content_is_rewound_before_upload() {
        let mut reader = Cursor::new(b"abcdef".to_vec());
        let mut skipped = [0u8; 3];
        reader.read_exact(&mut skipped).unwrap();

        let mut envelope =
            prepare_upload("blob.bin", Content::binary(reader), &StorageConfig::media()).unwrap();
        let mut body = Vec::new();
        envelope.body.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"abcdef");
        assert_eq!(envelope.body.len(), 6);
    }

    #[test]
    fn gzip_is_rolled_back_when_it_does_not_shrink() {
        let envelope =
            prepare_upload("tiny.txt", Content::text("a"), &StorageConfig::media()).unwrap();
        assert_eq!(envelope.content_encoding, None);
        assert!(envelope.headers.get(header::CONTENT_ENCODING).is_none());
        assert_eq!(envelope.body.len(), 1);
    }

    #[test]
    fn headers_carry_content_type_cache_control_and_metadata() {
        let mut config = StorageConfig::static_files();
        config
            .metadata
            .insert("x-goog-meta-source".to_owned(), "build".into());
        config.metadata.insert(
            "x-goog-meta-name".to_owned(),
            crate::config::MetadataValue::computed(|name| name.to_uppercase()),
        );

        let envelope =
            prepare_upload("css/site.css", Content::text("body{}".repeat(200)), &config).unwrap();

        assert_eq!(envelope.headers[header::CONTENT_TYPE], "text/css");
        assert_eq!(
            envelope.headers[header::CACHE_CONTROL],
            "public,max-age=31536000"
        );
        assert_eq!(envelope.headers[header::CONTENT_ENCODING], "gzip");
        assert_eq!(envelope.headers["x-goog-meta-source"], "build");
        assert_eq!(envelope.headers["x-goog-meta-name"], "CSS/SITE.CSS");
    }

    #[test]
    fn temporary_buffer_spills_past_the_threshold() {
        use std::io::Write;

        let mut buffer = temporary_buffer();
        buffer.write_all(&vec![b'x'; SPOOL_THRESHOLD]).unwrap();
        assert!(!buffer.is_rolled());
        buffer.write_all(b"x").unwrap();
        assert!(buffer.is_rolled());
    }
}
