use byteorder::{BigEndian, ByteOrder};
use segycp::config::{CopyOptions, InputSpec, OutputSpec};
use segycp::reel::{BinaryHeader, BINARY_HEADER_SIZE, TEXT_HEADER_SIZE};
use segycp::trace::{offset, read_word, TRACE_HEADER_SIZE};
use segycp::{DataFormat, TranscodeError, Transcoder};
use std::path::{Path, PathBuf};
use tempfile::{tempdir, NamedTempFile};

const REEL: usize = TEXT_HEADER_SIZE + BINARY_HEADER_SIZE;

fn reel_headers(samples: i16, format: DataFormat) -> Vec<u8> {
    let mut out = vec![0x40u8; TEXT_HEADER_SIZE];
    let mut bin = BinaryHeader::default();
    bin.samples_per_trace = samples;
    bin.set_data_format(format);
    out.extend_from_slice(&bin.encode());
    out
}

fn trace(cdp: i32, words: &[u32]) -> Vec<u8> {
    let mut t = vec![0u8; TRACE_HEADER_SIZE + 4 * words.len()];
    BigEndian::write_i32(&mut t[offset::CDP_ENSEMBLE..], cdp);
    BigEndian::write_u16(&mut t[offset::SAMPLE_COUNT..], words.len() as u16);
    BigEndian::write_i32(&mut t[offset::GROUP_X..], cdp);
    BigEndian::write_i32(&mut t[offset::GROUP_Y..], 1);
    BigEndian::write_u32_into(words, &mut t[TRACE_HEADER_SIZE..]);
    t
}

fn write_segy(path: &Path, format: DataFormat, traces: &[Vec<u8>], samples: i16) {
    let mut data = reel_headers(samples, format);
    for t in traces {
        data.extend_from_slice(t);
    }
    std::fs::write(path, data).unwrap();
}

fn copy(input: &Path, output: &Path, tweak: impl FnOnce(&mut CopyOptions)) -> segycp::CopySummary {
    let mut opts = CopyOptions {
        input: InputSpec::Path(input.to_path_buf()),
        output: Some(OutputSpec::Path(output.to_path_buf())),
        ..CopyOptions::default()
    };
    tweak(&mut opts);
    Transcoder::new(opts).unwrap().run().unwrap()
}

fn cdps(out: &[u8], trace_len: usize) -> Vec<i32> {
    out[REEL..]
        .chunks(trace_len)
        .map(|t| read_word(t, offset::CDP_ENSEMBLE))
        .collect()
}

#[test]
fn test_ibm_to_ieee_copy() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    let ibm_one = 0x4110_0000;
    let ibm_neg = 0xc276_a000;
    let traces = vec![trace(1, &[ibm_one, ibm_neg, 0, ibm_one]), trace(2, &[0, 0, ibm_one, 0])];
    write_segy(&input, DataFormat::IbmFloat, &traces, 4);

    let summary = copy(&input, &output, |o| o.format_override = Some(DataFormat::IeeeFloat));
    assert_eq!(summary.traces_written, 2);

    let out = std::fs::read(&output).unwrap();
    assert_eq!(out.len(), REEL + 2 * (TRACE_HEADER_SIZE + 16));
    let bin = BinaryHeader::from_record(&out[TEXT_HEADER_SIZE..REEL]);
    assert_eq!(bin.data_format(), DataFormat::IeeeFloat);
    assert_eq!(bin.samples(), 4);

    let first = &out[REEL + TRACE_HEADER_SIZE..REEL + TRACE_HEADER_SIZE + 16];
    let mut values = [0f32; 4];
    BigEndian::read_f32_into(first, &mut values);
    assert_eq!(values, [1.0, -118.625, 0.0, 1.0]);
}

#[test]
fn test_cdp_range_is_exclusive() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    let traces: Vec<_> = [99, 100, 150, 200, 201].iter().map(|&c| trace(c, &[0; 2])).collect();
    write_segy(&input, DataFormat::IbmFloat, &traces, 2);

    let summary = copy(&input, &output, |o| {
        o.cdp_min = 100;
        o.cdp_max = 200;
    });
    assert_eq!(summary.traces_written, 1);
    assert_eq!(summary.traces_filtered, 4);
    let out = std::fs::read(&output).unwrap();
    assert_eq!(cdps(&out, TRACE_HEADER_SIZE + 8), vec![150]);
}

#[test]
fn test_skip_keeps_order_and_restarts_sequence() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    let traces: Vec<_> = (1..=5).map(|c| trace(c, &[7])).collect();
    write_segy(&input, DataFormat::IbmFloat, &traces, 1);

    let summary = copy(&input, &output, |o| o.skip_traces = 3);
    assert_eq!(summary.traces_skipped, 3);
    assert_eq!(summary.first_cdp, Some(4));
    assert_eq!(summary.last_cdp, Some(5));

    let out = std::fs::read(&output).unwrap();
    let len = TRACE_HEADER_SIZE + 4;
    assert_eq!(cdps(&out, len), vec![4, 5]);
    assert_eq!(read_word(&out[REEL..], offset::SEQUENCE_IN_REEL), 1);
    assert_eq!(read_word(&out[REEL + len..], offset::SEQUENCE_IN_REEL), 2);
}

#[test]
fn test_max_traces_stops_early() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    let traces: Vec<_> = (1..=10).map(|c| trace(c, &[0])).collect();
    write_segy(&input, DataFormat::IbmFloat, &traces, 1);

    let summary = copy(&input, &output, |o| o.max_traces = Some(3));
    assert!(summary.trace_cap_reached);
    assert_eq!(summary.traces_written, 3);
    assert_eq!(std::fs::read(&output).unwrap().len(), REEL + 3 * (TRACE_HEADER_SIZE + 4));
}

#[test]
fn test_split_rotation_without_trailing_volume() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.sgy");
    let first = dir.path().join("part1");
    let traces: Vec<_> = (1..=5).map(|c| trace(c, &[0])).collect();
    write_segy(&input, DataFormat::IbmFloat, &traces, 1);

    let summary = copy(&input, &first, |o| o.split_size = Some(2));
    assert_eq!(summary.output_volumes, 3);

    let len = TRACE_HEADER_SIZE + 4;
    assert_eq!(std::fs::read(&first).unwrap().len(), REEL + 2 * len);
    assert_eq!(std::fs::read(dir.path().join("part2")).unwrap().len(), 2 * len);
    assert_eq!(std::fs::read(dir.path().join("part3")).unwrap().len(), len);
    assert!(!dir.path().join("part4").exists());
}

#[test]
fn test_short_trace_is_zero_padded() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    let mut short = trace(9, &[0xffff_ffff; 4]);
    short.truncate(TRACE_HEADER_SIZE + 6);
    write_segy(&input, DataFormat::Int32, &[trace(8, &[1; 4]), short], 4);

    copy(&input, &output, |_| {});
    let out = std::fs::read(&output).unwrap();
    let len = TRACE_HEADER_SIZE + 16;
    assert_eq!(out.len(), REEL + 2 * len);
    let last = &out[REEL + len..];
    assert_eq!(&last[TRACE_HEADER_SIZE..TRACE_HEADER_SIZE + 6], &[0xff; 6]);
    assert_eq!(&last[TRACE_HEADER_SIZE + 6..], &[0; 10]);
}

#[test]
fn test_blocked_input() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.blk"), dir.path().join("out.sgy"));
    let headers = reel_headers(2, DataFormat::Int32);
    let records = [
        headers[..TEXT_HEADER_SIZE].to_vec(),
        headers[TEXT_HEADER_SIZE..].to_vec(),
        trace(1, &[5, 6]),
        trace(2, &[7, 8]),
    ];
    let mut data = Vec::new();
    for r in &records {
        data.extend(format!("{:>8}", r.len()).into_bytes());
        data.extend_from_slice(r);
    }
    std::fs::write(&input, data).unwrap();

    let summary = copy(&input, &output, |o| o.blocked = true);
    assert_eq!(summary.traces_written, 2);
    let out = std::fs::read(&output).unwrap();
    assert_eq!(cdps(&out, TRACE_HEADER_SIZE + 8), vec![1, 2]);
}

#[test]
fn test_numbered_inputs_single_output() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("shot");
    write_segy(&dir.path().join("shot1"), DataFormat::IbmFloat, &[trace(1, &[0])], 1);
    write_segy(&dir.path().join("shot2"), DataFormat::IbmFloat, &[trace(2, &[0]), trace(3, &[0])], 1);
    let output = dir.path().join("all.sgy");

    let opts = CopyOptions {
        input: InputSpec::Numbered(base),
        output: Some(OutputSpec::Path(output.clone())),
        ..CopyOptions::default()
    };
    let summary = Transcoder::new(opts).unwrap().run().unwrap();
    assert_eq!(summary.reels, 2);
    assert_eq!(summary.traces_written, 3);

    let out = std::fs::read(&output).unwrap();
    let len = TRACE_HEADER_SIZE + 4;
    assert_eq!(cdps(&out, len), vec![1, 2, 3]);
    assert_eq!(read_word(&out[REEL + 2 * len..], offset::SEQUENCE_IN_REEL), 3);
}

#[test]
fn test_per_reel_outputs() {
    let dir = tempdir().unwrap();
    write_segy(&dir.path().join("shot1"), DataFormat::IbmFloat, &[trace(1, &[0])], 1);
    write_segy(&dir.path().join("shot2"), DataFormat::IbmFloat, &[trace(2, &[0])], 1);

    let opts = CopyOptions {
        input: InputSpec::Numbered(dir.path().join("shot")),
        output: Some(OutputSpec::PerReel(dir.path().join("reel"))),
        ..CopyOptions::default()
    };
    let summary = Transcoder::new(opts).unwrap().run().unwrap();
    assert_eq!(summary.output_volumes, 2);

    for (n, cdp) in [(1, 1), (2, 2)] {
        let out = std::fs::read(dir.path().join(format!("reel-{n}"))).unwrap();
        assert_eq!(out.len(), REEL + TRACE_HEADER_SIZE + 4);
        assert_eq!(read_word(&out[REEL..], offset::CDP_ENSEMBLE), cdp);
        assert_eq!(read_word(&out[REEL..], offset::SEQUENCE_IN_REEL), 1);
    }
}

#[test]
fn test_per_reel_outputs_without_headers() {
    let dir = tempdir().unwrap();
    write_segy(&dir.path().join("shot1"), DataFormat::IbmFloat, &[trace(1, &[0])], 1);
    write_segy(&dir.path().join("shot2"), DataFormat::IbmFloat, &[trace(2, &[0]), trace(3, &[0])], 1);

    let opts = CopyOptions {
        input: InputSpec::Numbered(dir.path().join("shot")),
        output: Some(OutputSpec::PerReel(dir.path().join("reel"))),
        no_headers: true,
        ..CopyOptions::default()
    };
    let summary = Transcoder::new(opts).unwrap().run().unwrap();
    assert_eq!(summary.output_volumes, 2);

    let len = TRACE_HEADER_SIZE + 4;
    let first = std::fs::read(dir.path().join("reel-1")).unwrap();
    assert_eq!(first.len(), len);
    assert_eq!(read_word(&first, offset::CDP_ENSEMBLE), 1);

    let second = std::fs::read(dir.path().join("reel-2")).unwrap();
    assert_eq!(second.len(), 2 * len);
    assert_eq!(read_word(&second, offset::SEQUENCE_IN_REEL), 1);
    assert_eq!(read_word(&second[len..], offset::SEQUENCE_IN_REEL), 2);
}

#[test]
fn test_no_headers_single_output() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    write_segy(&input, DataFormat::IbmFloat, &[trace(1, &[0]), trace(2, &[0])], 1);

    let summary = copy(&input, &output, |o| o.no_headers = true);
    assert_eq!(summary.traces_written, 2);
    let out = std::fs::read(&output).unwrap();
    assert_eq!(out.len(), 2 * (TRACE_HEADER_SIZE + 4));
    assert_eq!(read_word(&out, offset::CDP_ENSEMBLE), 1);
}

#[test]
fn test_later_reel_geometry_mismatch_keeps_first() {
    let dir = tempdir().unwrap();
    let ibm_one = 0x4110_0000;
    write_segy(&dir.path().join("shot1"), DataFormat::IbmFloat, &[trace(1, &[ibm_one, 0])], 2);
    // Second reel claims IEEE samples but is read with the first reel's layout.
    write_segy(&dir.path().join("shot2"), DataFormat::IeeeFloat, &[trace(2, &[0, ibm_one])], 2);
    let output = dir.path().join("all.sgy");

    let opts = CopyOptions {
        input: InputSpec::Numbered(dir.path().join("shot")),
        output: Some(OutputSpec::Path(output.clone())),
        ..CopyOptions::default()
    };
    let summary = Transcoder::new(opts).unwrap().run().unwrap();
    assert_eq!(summary.reels, 2);
    assert_eq!(summary.format_mismatches, 1);
    assert_eq!(summary.traces_written, 2);

    let out = std::fs::read(&output).unwrap();
    let len = TRACE_HEADER_SIZE + 8;
    assert_eq!(out.len(), REEL + 2 * len);
    let bin = BinaryHeader::from_record(&out[TEXT_HEADER_SIZE..REEL]);
    assert_eq!(bin.data_format(), DataFormat::IbmFloat);
    assert_eq!(cdps(&out, len), vec![1, 2]);
    let second = &out[REEL + len + TRACE_HEADER_SIZE..];
    assert_eq!(BigEndian::read_u32(&second[4..8]), ibm_one);
}

#[test]
fn test_coverage_and_summary_files() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    let cov: PathBuf = dir.path().join("cov.bin");
    let json = NamedTempFile::new().unwrap();
    write_segy(&input, DataFormat::IbmFloat, &[trace(10, &[0]), trace(11, &[0])], 1);

    let summary = copy(&input, &output, |o| {
        o.coverage = Some(format!("{} 20 4", cov.display()).parse().unwrap());
        o.summary_path = Some(json.path().to_path_buf());
    });
    assert_eq!(summary.coverage_rows, 2);

    let raw = std::fs::read(&cov).unwrap();
    assert_eq!(raw.len(), 2 * 7 * 4);
    let first = f32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]);
    assert_eq!(first, 10.0);

    let saved = segycp::CopySummary::from_bytes(&std::fs::read(json.path()).unwrap()).unwrap();
    assert_eq!(saved.traces_written, 2);
    assert!(saved.finished_at.is_some());
}

#[test]
fn test_text_header_override() {
    let dir = tempdir().unwrap();
    let (input, output) = (dir.path().join("in.sgy"), dir.path().join("out.sgy"));
    let ebcdic = dir.path().join("ebcdic");
    std::fs::write(&ebcdic, vec![0xc3u8; TEXT_HEADER_SIZE]).unwrap();
    write_segy(&input, DataFormat::IbmFloat, &[trace(1, &[0])], 1);

    copy(&input, &output, |o| o.text_header_override = Some(ebcdic.clone()));
    let out = std::fs::read(&output).unwrap();
    assert!(out[..TEXT_HEADER_SIZE].iter().all(|&b| b == 0xc3));
}

#[test]
fn test_cube_rejects_split() {
    let dir = tempdir().unwrap();
    let opts = CopyOptions {
        cube: Some(format!("{} 0 1 1 0 1 1 0 1 1", dir.path().join("cube").display()).parse().unwrap()),
        split_size: Some(5),
        ..CopyOptions::default()
    };
    assert!(matches!(Transcoder::new(opts), Err(TranscodeError::Config(_))));
}

#[test]
fn test_cube_from_copy() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.sgy");
    let cube = dir.path().join("cube.bin");
    // lines 1..2 from group X (the cdp here), trace 1 from group Y, samples 0..1
    write_segy(&input, DataFormat::IeeeFloat, &[
        trace(1, &[1.0f32.to_bits(), 2.0f32.to_bits()]),
        trace(2, &[3.0f32.to_bits(), 4.0f32.to_bits()]),
        trace(3, &[9.0f32.to_bits(), 9.0f32.to_bits()]),
    ], 2);

    let opts = CopyOptions {
        input: InputSpec::Path(input),
        cube: Some(format!("{} 1 2 1 1 1 1 0 1 1", cube.display()).parse().unwrap()),
        ..CopyOptions::default()
    };
    let summary = Transcoder::new(opts).unwrap().run().unwrap();
    assert_eq!(summary.cube_traces, 2);
    assert_eq!(summary.cube_skipped, 1);

    let raw = std::fs::read(&cube).unwrap();
    let mut values = [0f32; 4];
    BigEndian::read_f32_into(&raw, &mut values);
    assert_eq!(values, [1.0, 2.0, 3.0, 4.0]);
}
