//! Stream filter pipeline.
//!
//! A stream's `/Filter` entry names one or more decoders applied in
//! order, each optionally parameterized by the matching `/DecodeParms`
//! dictionary. Callers resolve indirect references in both before
//! handing the pairs here.

use crate::codec::ascii85::{ascii85decode, asciihexdecode};
use crate::codec::ccitt::ccittfaxdecode;
use crate::codec::flate::{apply_predictor, flatedecode};
use crate::codec::lzw::lzwdecode_with_earlychange;
use crate::codec::runlength::rldecode;
use crate::error::{PdfError, Result};
use crate::model::Dict;

fn param_int(params: &Dict, key: &str, default: i64) -> i64 {
    match params.get(key) {
        Some(obj) => obj.as_int().unwrap_or(default),
        None => default,
    }
}

fn run_predictor(data: Vec<u8>, params: &Dict) -> Result<Vec<u8>> {
    let predictor = param_int(params, "Predictor", 1);
    if predictor == 1 {
        return Ok(data);
    }
    apply_predictor(
        data,
        predictor,
        param_int(params, "Colors", 1),
        param_int(params, "BitsPerComponent", 8),
        param_int(params, "Columns", 1),
    )
}

/// Apply a chain of stream filters to raw stream data.
///
/// Each element pairs a filter name (canonical or abbreviated) with its
/// decode parameters (empty when absent). Image codecs (DCT, JPX) pass
/// through untouched since their output is the compressed image itself;
/// CCITT data is wrapped in a TIFF container rather than decompressed.
pub fn apply_filters(data: &[u8], filters: &[(String, Dict)]) -> Result<Vec<u8>> {
    let mut data = data.to_vec();
    for (name, params) in filters {
        data = match name.as_str() {
            "FlateDecode" | "Fl" => run_predictor(flatedecode(&data)?, params)?,
            "LZWDecode" | "LZW" => {
                let early = param_int(params, "EarlyChange", 1);
                run_predictor(lzwdecode_with_earlychange(&data, early)?, params)?
            }
            "ASCIIHexDecode" | "AHx" => asciihexdecode(&data)?,
            "ASCII85Decode" | "A85" => ascii85decode(&data)?,
            "RunLengthDecode" | "RL" => rldecode(&data)?,
            "CCITTFaxDecode" | "CCF" => {
                let k = param_int(params, "K", 0);
                let columns = param_int(params, "Columns", 1728);
                let rows = param_int(params, "Rows", 0);
                ccittfaxdecode(&data, k, columns, rows)
            }
            // Compressed image payloads are the useful artifact; hand
            // them to the caller as-is.
            "DCTDecode" | "DCT" | "JPXDecode" | "JBIG2Decode" => data,
            "Crypt" => {
                let identity = match params.get("Name") {
                    None => true,
                    Some(obj) => obj.as_name().map(|n| n == "Identity").unwrap_or(false),
                };
                if !identity {
                    return Err(PdfError::UnsupportedFilter(
                        "non-Identity Crypt filter".into(),
                    ));
                }
                data
            }
            other => return Err(PdfError::UnsupportedFilter(other.into())),
        };
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::flate::flateencode;
    use crate::model::PDFObject;

    #[test]
    fn chained_ascii85_then_flate() {
        let payload = b"filter pipeline payload";
        let compressed = flateencode(payload);
        // Hex-wrap the compressed bytes to exercise ordering.
        let hexed: Vec<u8> = {
            let mut s = hex::encode(&compressed).into_bytes();
            s.push(b'>');
            s
        };
        let chain = vec![
            ("AHx".to_string(), Dict::default()),
            ("FlateDecode".to_string(), Dict::default()),
        ];
        assert_eq!(apply_filters(&hexed, &chain).unwrap(), payload);
    }

    #[test]
    fn unknown_filter_is_fatal() {
        let chain = vec![("NoSuchDecode".to_string(), Dict::default())];
        assert!(matches!(
            apply_filters(b"", &chain),
            Err(PdfError::UnsupportedFilter(_))
        ));
    }

    #[test]
    fn crypt_identity_passes_and_named_fails() {
        let identity = vec![("Crypt".to_string(), Dict::default())];
        assert_eq!(apply_filters(b"abc", &identity).unwrap(), b"abc");

        let mut params = Dict::default();
        params.insert("Name".to_string(), PDFObject::name("StdCF"));
        let named = vec![("Crypt".to_string(), params)];
        assert!(apply_filters(b"abc", &named).is_err());
    }
}
