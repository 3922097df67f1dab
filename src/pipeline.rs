use crate::candidate::StageCounters;
use crate::error::{Result, TuneError};
use crate::filter::Filter;
use crate::param;
use crate::testcase::Testcase;
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Drives one (candidate, testcase) pair through the external decode chain:
/// filter the samples, stream them to the encoder, feed the coded artifact to
/// the decoder and parse its per-stage counters. Everything happens inside a
/// scratch directory that is removed when this function returns, success or
/// failure, so concurrent evaluations never collide.
pub fn evaluate(
    filter: &Filter,
    values: &BTreeMap<String, f64>,
    testcase: &Testcase,
    cfg: &param::Pipeline,
) -> Result<StageCounters> {
    let filtered = filter.transform(values, &testcase.samples)?;
    let bytes = to_s16le(&filtered);

    let scratch = TempDir::new()?;
    let artifact = scratch.path().join("coded.efm");

    run_encoder(cfg, &bytes, &artifact)?;

    let artifact_len = fs::metadata(&artifact).map(|m| m.len()).unwrap_or(0);
    if artifact_len == 0 {
        // The decoder blocks on an interactive prompt for a strictly empty
        // artifact; one byte of padding yields all-zero counters instead.
        fs::write(&artifact, [0u8])?;
        debug!("empty artifact for {}, padded with one byte", testcase.source);
    }

    let diagnostics = run_decoder(cfg, &artifact, &scratch.path().join("decoded.raw"))?;
    parse_stage_counters(&diagnostics)
}

/// Clamps and rounds filtered samples back to signed 16-bit little-endian.
pub fn to_s16le(samples: &[f64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
        bytes.extend_from_slice(&clamped.to_le_bytes());
    }
    bytes
}

fn run_encoder(cfg: &param::Pipeline, bytes: &[u8], artifact: &Path) -> Result<()> {
    let mut child = Command::new(&cfg.encode_command)
        .args(&cfg.encode_args)
        .arg(artifact)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| TuneError::CollaboratorSpawn {
            command: cfg.encode_command.clone(),
            source,
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        // An encoder dying mid-stream surfaces through its exit status
        let _ = stdin.write_all(bytes);
    }

    let status = child.wait()?;
    if !status.success() {
        return Err(TuneError::CollaboratorFailed {
            command: cfg.encode_command.clone(),
            code: status.code().unwrap_or(-1),
        });
    }
    Ok(())
}

fn run_decoder(cfg: &param::Pipeline, artifact: &Path, sink: &Path) -> Result<String> {
    let output = Command::new(&cfg.decode_command)
        .args(&cfg.decode_args)
        .arg(artifact)
        .arg(sink)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| TuneError::CollaboratorSpawn {
            command: cfg.decode_command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(TuneError::CollaboratorFailed {
            command: cfg.decode_command.clone(),
            code: output.status.code().unwrap_or(-1),
        });
    }
    Ok(String::from_utf8_lossy(&output.stderr).into_owned())
}

/// Extracts the six stage counters from the decoder's diagnostic text.
///
/// The text is organized as `Section name:` headers followed by indented
/// `name: integer` lines; anything else is ignored. Fewer than six matched
/// counters means the diagnostic format drifted and is an evaluation error.
pub fn parse_stage_counters(text: &str) -> Result<StageCounters> {
    let mut section = "";
    let mut valid_syncs = None;
    let mut valid_symbols = None;
    let mut valid_frames = None;
    let mut input_frames = None;
    let mut output_frames = None;
    let mut valid_outputs = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.ends_with(':') {
            section = line.trim_end_matches(':').trim_end();
            continue;
        }
        if let Some((name, count)) = line.split_once(':') {
            if let Ok(count) = count.trim().parse::<u64>() {
                match (section, name.trim()) {
                    ("EFM to F3 frames", "Valid syncs") => valid_syncs = Some(count),
                    ("EFM to F3 frames", "Valid symbols") => valid_symbols = Some(count),
                    ("EFM to F3 frames", "Valid frames") => valid_frames = Some(count),
                    ("F3 to F2 frames", "Input frames") => input_frames = Some(count),
                    ("F3 to F2 frames", "Output frames") => output_frames = Some(count),
                    ("F2 to F1 frames", "Valid frames") => valid_outputs = Some(count),
                    _ => {}
                }
            }
        }
    }

    let counters = [
        valid_syncs,
        valid_symbols,
        valid_frames,
        input_frames,
        output_frames,
        valid_outputs,
    ];
    let found = counters.iter().filter(|c| c.is_some()).count();
    if found != 6 {
        return Err(TuneError::MalformedStats { found });
    }

    Ok(StageCounters {
        valid_syncs: valid_syncs.unwrap_or(0),
        valid_symbols: valid_symbols.unwrap_or(0),
        valid_frames: valid_frames.unwrap_or(0),
        input_frames: input_frames.unwrap_or(0),
        output_frames: output_frames.unwrap_or(0),
        valid_outputs: valid_outputs.unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIAGNOSTICS: &str = "\
Processing coded.efm
EFM to F3 frames:
  Valid syncs: 100
  Valid symbols: 99
  Invalid symbols: 12
  Valid frames: 90
F3 to F2 frames:
  Input frames: 90
  Output frames: 88
F2 to F1 frames:
  Valid frames: 80
  Padding: none
Done.
";

    #[test]
    fn parses_all_six_counters() {
        let counters = parse_stage_counters(DIAGNOSTICS).unwrap();
        assert_eq!(counters.valid_syncs, 100);
        assert_eq!(counters.valid_symbols, 99);
        assert_eq!(counters.valid_frames, 90);
        assert_eq!(counters.input_frames, 90);
        assert_eq!(counters.output_frames, 88);
        assert_eq!(counters.valid_outputs, 80);
        assert_eq!(counters.weighted(), 258_289);
    }

    #[test]
    fn same_counter_name_is_disambiguated_by_section() {
        let counters = parse_stage_counters(DIAGNOSTICS).unwrap();
        assert_ne!(counters.valid_frames, counters.valid_outputs);
    }

    #[test]
    fn missing_counter_is_malformed() {
        let truncated = DIAGNOSTICS.replace("  Output frames: 88\n", "");
        let err = parse_stage_counters(&truncated).unwrap_err();
        assert!(matches!(err, TuneError::MalformedStats { found: 5 }));
    }

    #[test]
    fn counters_outside_a_section_are_ignored() {
        let stray = format!("Valid syncs: 4\n{}", DIAGNOSTICS);
        let counters = parse_stage_counters(&stray).unwrap();
        assert_eq!(counters.valid_syncs, 100);
    }

    #[test]
    fn empty_text_reports_zero_found() {
        assert!(matches!(
            parse_stage_counters("").unwrap_err(),
            TuneError::MalformedStats { found: 0 }
        ));
    }

    #[test]
    fn s16le_conversion_rounds_and_clamps() {
        let bytes = to_s16le(&[0.4, -1.6, 40_000.0, -40_000.0]);
        let decoded: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(decoded, vec![0, -2, 32_767, -32_768]);
    }
}
