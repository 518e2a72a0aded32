//! Attribute-table encoding detection.
//!
//! Shapefiles collected in the field rarely agree on a text encoding. The
//! `.cpg` sidecar is trusted first, then the raw `.dbf` bytes are sniffed,
//! and `gbk` is assumed when nothing else is conclusive.

use chardetng::EncodingDetector;
use encoding_rs::{DecoderResult, Encoding, GBK, UTF_8, WINDOWS_1252};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::debug;

use crate::zip_handler::sidecar_path;

pub const DEFAULT_ENCODING: &str = "gbk";

const DBF_SAMPLE_LEN: u64 = 10_000;
const SNIFF_SAMPLE_LEN: usize = 100;
const SNIFF_CANDIDATES: [&str; 5] = ["gbk", "utf-8", "cp936", "latin1", "mbcs"];

type Strategy = fn(&Path) -> Option<String>;

/// Detection strategies in priority order.
const STRATEGIES: [(&str, Strategy); 2] = [("cpg", from_cpg), ("dbf", from_dbf)];

/// Best-guess encoding label for the attribute table of `geometry_file`.
///
/// Never fails: unreadable or missing sidecars fall through to the next
/// strategy and finally to [`DEFAULT_ENCODING`].
pub fn detect_encoding(geometry_file: &Path) -> String {
    for (name, strategy) in STRATEGIES {
        if let Some(label) = strategy(geometry_file) {
            debug!("Encoding {} resolved from {} sidecar", label, name);
            return label;
        }
    }
    DEFAULT_ENCODING.to_string()
}

/// Maps a `.cpg` token onto a canonical label.
pub fn normalize_cpg_token(token: &str) -> Option<&'static str> {
    let token = token.trim_start_matches('\u{feff}').trim().to_ascii_lowercase();
    match token.as_str() {
        "gbk" | "gb2312" | "cp936" | "ansi" => Some("gbk"),
        "utf-8" | "utf8" => Some("utf-8"),
        "latin1" | "iso-8859-1" => Some("latin1"),
        _ => None,
    }
}

fn from_cpg(geometry_file: &Path) -> Option<String> {
    let cpg = sidecar_path(geometry_file, "cpg")?;
    let bytes = std::fs::read(cpg).ok()?;
    normalize_cpg_token(&String::from_utf8_lossy(&bytes)).map(str::to_string)
}

fn from_dbf(geometry_file: &Path) -> Option<String> {
    let dbf = sidecar_path(geometry_file, "dbf")?;
    let mut sample = Vec::new();
    File::open(dbf)
        .ok()?
        .take(DBF_SAMPLE_LEN)
        .read_to_end(&mut sample)
        .ok()?;
    sniff_bytes(&sample)
}

/// Statistical detection with a strict-decode fallback over fixed candidates.
pub fn sniff_bytes(sample: &[u8]) -> Option<String> {
    let mut detector = EncodingDetector::new();
    detector.feed(sample, true);
    let (encoding, confident) = detector.guess_assess(None, true);
    if confident {
        return Some(normalize_detected(encoding));
    }

    let sample = &sample[..sample.len().min(SNIFF_SAMPLE_LEN)];
    SNIFF_CANDIDATES
        .iter()
        .find(|label| encoding_for_label(label).is_some_and(|enc| decodes_cleanly(enc, sample)))
        .map(|label| label.to_string())
}

fn normalize_detected(encoding: &'static Encoding) -> String {
    let name = encoding.name().to_ascii_lowercase();
    if name.contains("gb") || name.contains("cp936") {
        DEFAULT_ENCODING.to_string()
    } else {
        name
    }
}

fn encoding_for_label(label: &str) -> Option<&'static Encoding> {
    match label {
        "gbk" | "cp936" | "mbcs" => Some(GBK),
        "utf-8" => Some(UTF_8),
        "latin1" => Some(WINDOWS_1252),
        _ => None,
    }
}

// 样本末尾被截断的多字节序列不算解码失败
fn decodes_cleanly(encoding: &'static Encoding, sample: &[u8]) -> bool {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder
        .max_utf8_buffer_length_without_replacement(sample.len())
        .unwrap_or(sample.len() * 4);
    let mut out = String::with_capacity(capacity);
    let (result, _) = decoder.decode_to_string_without_replacement(sample, &mut out, false);
    !matches!(result, DecoderResult::Malformed(..))
}
