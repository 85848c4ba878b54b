use super::*;

// Shared test helpers
fn lcg_sizes(seed: u64, len: usize) -> Vec<usize> {
    let mut x = seed;
    let mut out = Vec::new();
    let mut total = 0usize;
    while total < len {
        // LCG: constants from Numerical Recipes
        x = x.wrapping_mul(1664525).wrapping_add(1013904223);
        // chunk size in [1..16]
        let mut n = (((x >> 24) as usize) % 16) + 1;
        if total + n > len {
            n = len - total;
        }
        out.push(n);
        total += n;
    }
    out
}

fn chunk_by_char(s: &str, sizes: &[usize]) -> Vec<String> {
    let mut res = Vec::new();
    let mut iter = s.chars();
    for &n in sizes {
        let chunk: String = iter.by_ref().take(n).collect();
        if chunk.is_empty() {
            break;
        }
        res.push(chunk);
    }
    let rest: String = iter.collect();
    if !rest.is_empty() {
        res.push(rest);
    }
    res
}

fn chunk_by_byte<'a>(s: &'a str, sizes: &[usize]) -> Vec<&'a [u8]> {
    let bytes = s.as_bytes();
    let mut res = Vec::new();
    let mut at = 0usize;
    for &n in sizes {
        if at >= bytes.len() {
            break;
        }
        let end = (at + n).min(bytes.len());
        res.push(&bytes[at..end]);
        at = end;
    }
    if at < bytes.len() {
        res.push(&bytes[at..]);
    }
    res
}

fn sep_opts(mode: ExtractionMode) -> Options {
    Options {
        mode,
        delimiter: "[SEP]".to_string(),
        ..Default::default()
    }
}

fn parse_bytes(chunks: &[&[u8]], opts: &Options) -> ResponseModel {
    let mut parser = TurnParser::new(opts.clone()).unwrap();
    for c in chunks {
        parser.push_bytes(c).unwrap();
    }
    parser.finish();
    parser.into_model()
}

fn question(number: &str) -> SolvedQuestion {
    SolvedQuestion::new(None, number)
}

// Submodules (topic-based)
mod json_blocks;
mod merging;
mod sanitizer;
