use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use percent_encoding::percent_decode_str;

use crate::augment::EMBEDDED_SCHEME;
use crate::store::Store;

/// Components of a synthetic embedded-content URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct EmbeddedRef {
    pub(crate) log_uri: String,
    pub(crate) run_index: usize,
    pub(crate) artifact_index: usize,
    pub(crate) file_name: String,
}

/// Parses a `sarif:` URI produced by the augmenter.
pub(crate) fn parse_embedded_uri(uri: &str) -> Option<EmbeddedRef> {
    let rest = uri.strip_prefix(EMBEDDED_SCHEME)?;
    let mut parts = rest.splitn(4, '/');
    let origin = parts.next()?;
    let run_index = parts.next()?.parse().ok()?;
    let artifact_index = parts.next()?.parse().ok()?;
    let file_name = parts.next()?.to_string();
    let log_uri = percent_decode_str(origin).decode_utf8().ok()?.into_owned();
    Some(EmbeddedRef {
        log_uri,
        run_index,
        artifact_index,
        file_name,
    })
}

/// Renders the embedded contents a synthetic URI refers to.
/// Text renders verbatim, binary as a hex dump.
pub(crate) fn embedded_content(store: &Store, uri: &str) -> Option<String> {
    let embedded = parse_embedded_uri(uri)?;
    let log = store.find_log(&embedded.log_uri)?;
    let artifact = log
        .sarif
        .runs
        .get(embedded.run_index)?
        .artifacts
        .as_ref()?
        .get(embedded.artifact_index)?;
    let contents = artifact.contents.as_ref()?;
    if let Some(text) = &contents.text {
        return Some(text.clone());
    }
    let binary = contents.binary.as_deref()?;
    let bytes = BASE64.decode(binary).ok()?;
    Some(hex_dump(&bytes))
}

/// Two-digit bytes, a space after every second byte, a newline after
/// every sixteenth.
fn hex_dump(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 3);
    for (index, byte) in bytes.iter().enumerate() {
        output.push_str(&format!("{byte:02x}"));
        if index % 2 == 1 {
            output.push(' ');
        }
        if index % 16 == 15 {
            output.push('\n');
        }
    }
    output
}
