#![no_main]

use influx_batch_publisher::{build_point, encode_point, LinePacker};
use libfuzzer_sys::fuzz_target;

// Fuzz target focusing on escaping of arbitrary measurements and tags
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    let text = String::from_utf8_lossy(data).to_string();
    let chunk_size = (text.len() / 4).max(1);
    let parts: Vec<String> = text
        .chars()
        .collect::<Vec<_>>()
        .chunks(chunk_size)
        .map(|c| c.iter().collect())
        .collect();

    let measurement = parts[0].clone();
    let tags: Vec<(String, String)> = parts[1..]
        .chunks(2)
        .filter(|pair| pair.len() == 2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    let value = f64::from(data[0]) - f64::from(data[1]);

    let point = build_point(measurement, tags, value);
    let mut buf = String::new();
    if encode_point(&point, &mut buf).is_ok() {
        // one line, terminated, with no raw newline inside
        assert!(buf.ends_with('\n'));
        assert_eq!(buf.matches('\n').count(), 1);
    } else {
        assert!(buf.is_empty());
    }

    let mut packer = LinePacker::new(usize::from(data[0]) + 1, usize::from(data[1]));
    if let Ok(Some(chunk)) = packer.push(&point) {
        assert!(chunk.len() <= usize::from(data[0]) + 1);
    }
});
