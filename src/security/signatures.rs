//! File signature (magic number) table.
//!
//! Maps a declared MIME type to the content kind it claims to be, and each
//! content kind to the byte prefixes a genuine file of that kind starts with.
//! Text-like kinds have no reliable signature and are explicitly `Unchecked`.

/// Content kinds the upload validator knows how to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Webp,
    Avi,
    Wav,
    Zip,
    Docx,
    Xlsx,
    Pptx,
    PlainText,
    Markdown,
    Csv,
    Json,
}

/// Expected leading bytes for a content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// No reliable signature; the buffer is not inspected.
    Unchecked,
    /// The buffer must start with at least one of these prefixes.
    Prefixes(&'static [&'static [u8]]),
}

const PDF: &[&[u8]] = &[b"%PDF"];
const PNG: &[&[u8]] = &[&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]];
const JPEG: &[&[u8]] = &[&[0xFF, 0xD8, 0xFF]];
const GIF: &[&[u8]] = &[b"GIF87a", b"GIF89a"];
const RIFF: &[&[u8]] = &[b"RIFF"];
// Empty archives use the end-of-central-directory record as their first bytes.
const ZIP: &[&[u8]] = &[&[0x50, 0x4B, 0x03, 0x04], &[0x50, 0x4B, 0x05, 0x06]];
const OOXML: &[&[u8]] = &[&[0x50, 0x4B, 0x03, 0x04]];

const MIME_TABLE: &[(&str, ContentKind)] = &[
    ("application/pdf", ContentKind::Pdf),
    ("image/png", ContentKind::Png),
    ("image/jpeg", ContentKind::Jpeg),
    ("image/jpg", ContentKind::Jpeg),
    ("image/gif", ContentKind::Gif),
    ("image/webp", ContentKind::Webp),
    ("video/x-msvideo", ContentKind::Avi),
    ("video/avi", ContentKind::Avi),
    ("audio/wav", ContentKind::Wav),
    ("audio/x-wav", ContentKind::Wav),
    ("application/zip", ContentKind::Zip),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ContentKind::Docx,
    ),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ContentKind::Xlsx,
    ),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ContentKind::Pptx,
    ),
    ("text/plain", ContentKind::PlainText),
    ("text/markdown", ContentKind::Markdown),
    ("text/csv", ContentKind::Csv),
    ("application/json", ContentKind::Json),
];

impl ContentKind {
    /// Look up the kind for a normalised MIME type.
    pub fn from_mime(mime: &str) -> Option<Self> {
        MIME_TABLE
            .iter()
            .find(|(name, _)| *name == mime)
            .map(|(_, kind)| *kind)
    }

    pub fn signature(&self) -> Signature {
        match self {
            ContentKind::Pdf => Signature::Prefixes(PDF),
            ContentKind::Png => Signature::Prefixes(PNG),
            ContentKind::Jpeg => Signature::Prefixes(JPEG),
            ContentKind::Gif => Signature::Prefixes(GIF),
            ContentKind::Webp | ContentKind::Avi | ContentKind::Wav => Signature::Prefixes(RIFF),
            ContentKind::Zip => Signature::Prefixes(ZIP),
            ContentKind::Docx | ContentKind::Xlsx | ContentKind::Pptx => {
                Signature::Prefixes(OOXML)
            }
            ContentKind::PlainText
            | ContentKind::Markdown
            | ContentKind::Csv
            | ContentKind::Json => Signature::Unchecked,
        }
    }
}

/// Lower-case a MIME type and drop parameters (`text/plain; charset=utf-8`).
pub fn normalize_mime(declared: &str) -> String {
    declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether `bytes` carries a valid signature for `kind`.
pub fn matches_signature(kind: ContentKind, bytes: &[u8]) -> bool {
    match kind.signature() {
        Signature::Unchecked => true,
        Signature::Prefixes(prefixes) => prefixes.iter().any(|prefix| bytes.starts_with(prefix)),
    }
}
