use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::ParseError;

/// Opens a file for line reading, transparently decompressing `.gz`.
pub fn open_text<P: AsRef<Path>>(path: P) -> std::io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let is_gz = path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    Ok(if is_gz {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    })
}

/// Minimal multi-line FASTA reader returning `(id, sequence)` pairs in file order.
///
/// The id is the header up to the first whitespace. With `truncate_at_semicolon`
/// it is further cut at the first `;`, dropping `;size=<int>;` style annotations.
pub fn read_fasta_records<R: BufRead>(
    mut reader: R,
    truncate_at_semicolon: bool,
) -> Result<Vec<(String, String)>, ParseError> {
    let mut records = Vec::new();
    let mut current: Option<(String, String)> = None;
    let mut line = String::new();
    let mut line_no = 0usize;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break; // EOF
        }
        line_no += 1;
        let text = line.trim_end();
        if text.is_empty() {
            continue;
        }

        if let Some(header) = text.strip_prefix('>') {
            if let Some(done) = current.take() {
                records.push(done);
            }
            let mut id = header.split_whitespace().next().unwrap_or("");
            if truncate_at_semicolon {
                id = id.split(';').next().unwrap_or("");
            }
            if id.is_empty() {
                return Err(ParseError::MalformedFasta(format!(
                    "empty record id on line {line_no}"
                )));
            }
            current = Some((id.to_string(), String::new()));
        } else {
            match current.as_mut() {
                Some((_, seq)) => seq.push_str(text.trim()),
                None => {
                    return Err(ParseError::MalformedFasta(format!(
                        "sequence data before the first header on line {line_no}"
                    )))
                }
            }
        }
    }

    if let Some(done) = current {
        records.push(done);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_wrapped_sequences() {
        let text = ">Uniq1;size=100;\nACGT\nAC\n>Uniq2;size=5;\nGGGG\n";
        let records = read_fasta_records(Cursor::new(text), true).unwrap();
        assert_eq!(
            records,
            vec![
                ("Uniq1".to_string(), "ACGTAC".to_string()),
                ("Uniq2".to_string(), "GGGG".to_string()),
            ]
        );
    }

    #[test]
    fn keeps_annotations_without_truncation() {
        let text = ">Zotu1;uniq=Uniq1\nACGT\n";
        let records = read_fasta_records(Cursor::new(text), false).unwrap();
        assert_eq!(records[0].0, "Zotu1;uniq=Uniq1");
    }

    #[test]
    fn rejects_headerless_sequence() {
        let err = read_fasta_records(Cursor::new("ACGT\n>a\nA\n"), true).unwrap_err();
        assert!(matches!(err, ParseError::MalformedFasta(_)));
    }
}
