//! End-to-end test for the tuning engine against stub collaborators.
//!
//! The stubs stand in for the external encode/decode chain: the encoder
//! copies its stdin into the coded artifact, the decoder emits a fixed set
//! of stage counters on stderr. This exercises the whole path: testcase
//! loading, filtering, process orchestration, scoring, steady-state
//! selection and leaderboard persistence/resume.
//!
//! Run with: cargo test --test test_tune_e2e -- --nocapture
#![cfg(unix)]

use efmtune::error::TuneError;
use efmtune::param::Param;
use efmtune::pipeline;
use efmtune::population::Population;
use efmtune::run;
use efmtune::testcase::Testcase;
use efmtune::{filter, param};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const COUNTER_SCRIPT: &str = r#"#!/bin/sh
cat "$1" > "$2"
cat >&2 <<'EOF'
EFM to F3 frames:
  Valid syncs: 1
  Valid symbols: 1
  Valid frames: 1
F3 to F2 frames:
  Input frames: 1
  Output frames: 1
F2 to F1 frames:
  Valid frames: 1
EOF
"#;

/// Weighted score of the stub counters for one testcase.
const STUB_SCORE_PER_TESTCASE: u64 = 1 + 1 + 1 + 1000 * 3;

fn write_script(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

fn write_testcase(path: &Path, samples: usize) {
    let mut bytes = Vec::with_capacity(samples * 2);
    for i in 0..samples {
        let value = (((i * 2731) % 4001) as i16) - 2000;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    fs::write(path, bytes).unwrap();
}

struct Workspace {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

fn workspace(decode_script: &str) -> (Workspace, Param) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let testcase_dir = root.join("testcases");
    fs::create_dir(&testcase_dir).unwrap();
    write_testcase(&testcase_dir.join("sample_a.s16"), 64);
    write_testcase(&testcase_dir.join("sample_b.s16"), 64);

    let encode = root.join("stub-encode.sh");
    write_script(&encode, "#!/bin/sh\ncat > \"$1\"\n");
    let decode = root.join("stub-decode.sh");
    write_script(&decode, decode_script);

    let mut param = Param::default();
    param.general.filter = "biquad".to_string();
    param.general.seed = 42;
    param.data.testcase_dir = testcase_dir.to_string_lossy().into_owned();
    param.data.sample_len = 64;
    param.data.sample_rate = 48_000.0;
    param.de.population_multiplier = 1;
    param.de.max_generations = 2;
    param.de.leaderboard = root.join("leaderboard.jsonl").to_string_lossy().into_owned();
    param.pipeline.encode_command = encode.to_string_lossy().into_owned();
    param.pipeline.decode_command = decode.to_string_lossy().into_owned();
    param::validate(&param).unwrap();

    (Workspace { _dir: dir, root }, param)
}

#[test]
fn search_fills_evolves_and_persists() {
    let (ws, param) = workspace(COUNTER_SCRIPT);
    let running = Arc::new(AtomicBool::new(true));

    let population = run(&param, running).unwrap();

    // multiplier 1 x 5 tunable biquad parameters
    assert_eq!(population.members.len(), 5);

    let space = filter::filter(&param.general.filter)
        .unwrap()
        .param_space(param.data.sample_rate);
    let expected = Some(2 * STUB_SCORE_PER_TESTCASE);
    for member in &population.members {
        assert!(space.in_bounds(&member.values));
        assert_eq!(member.score, expected);
        assert_eq!(member.values["sample_rate"], 48_000.0);
    }

    let leaderboard = ws.root.join("leaderboard.jsonl");
    let text = fs::read_to_string(&leaderboard).unwrap();
    assert_eq!(text.lines().count(), 5);

    // A search restarted from this leaderboard continues past generation 1
    let (restored, next_generation) = Population::load(&leaderboard).unwrap();
    assert_eq!(next_generation, 2);
    assert_eq!(restored.members.len(), 5);
    for (orig, back) in population.members.iter().zip(&restored.members) {
        assert_eq!(back.values, orig.values);
        assert_eq!(back.score, orig.score);
        assert_eq!(back.target, None);
    }
}

#[test]
fn resumed_search_starts_after_the_recorded_generation() {
    let (_ws, param) = workspace(COUNTER_SCRIPT);
    let running = Arc::new(AtomicBool::new(true));

    let first = run(&param, Arc::clone(&running)).unwrap();
    // max_generations already reached: the resumed run must not redo anything
    let second = run(&param, running).unwrap();
    assert_eq!(second.members.len(), first.members.len());
    for (a, b) in first.members.iter().zip(&second.members) {
        assert_eq!(a.values, b.values);
        assert_eq!(a.score, b.score);
    }
}

#[test]
fn failing_decoder_aborts_the_search() {
    let (_ws, param) = workspace("#!/bin/sh\nexit 3\n");
    let running = Arc::new(AtomicBool::new(true));

    let err = run(&param, running).unwrap_err();
    assert!(matches!(
        err,
        TuneError::CollaboratorFailed { code: 3, .. }
    ));
}

#[test]
fn drifted_diagnostics_abort_the_search() {
    let truncated = COUNTER_SCRIPT.replace("  Output frames: 1\n", "");
    let (_ws, param) = workspace(&truncated);
    let running = Arc::new(AtomicBool::new(true));

    let err = run(&param, running).unwrap_err();
    assert!(matches!(err, TuneError::MalformedStats { found: 5 }));
}

#[test]
fn empty_artifact_is_padded_before_decoding() {
    // This encoder never writes the artifact at all; the pipeline must pad
    // it so the decoder still runs instead of hanging on an empty file.
    let (ws, mut param) = workspace(COUNTER_SCRIPT);
    let lazy_encode = ws.root.join("stub-encode-lazy.sh");
    write_script(&lazy_encode, "#!/bin/sh\ncat > /dev/null\n");
    param.pipeline.encode_command = lazy_encode.to_string_lossy().into_owned();

    let family = filter::filter(&param.general.filter).unwrap();
    let space = family.param_space(param.data.sample_rate);
    let testcase = Testcase {
        source: "synthetic".to_string(),
        samples: vec![0.0; 64],
    };

    let counters =
        pipeline::evaluate(&family, space.defaults(), &testcase, &param.pipeline).unwrap();
    assert_eq!(counters.weighted(), STUB_SCORE_PER_TESTCASE);
}
