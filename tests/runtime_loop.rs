use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use social_distancing::detect::ScriptStep;
use social_distancing::{
    compute_violations, write_timing_log, CalibrationArtifact, Detection, DetectorState,
    DistanceMode, EndReason, Error, Frame, FrameSink, FrameSource, HomographyMatrix, NullSink,
    RunOptions, ScriptedDetector, SourceOptions, StubDetector, SyntheticSource,
    ViolationDetector, ViolationPair,
};

fn artifact(scale: f64) -> CalibrationArtifact {
    CalibrationArtifact::new(HomographyMatrix::identity(), scale).expect("valid artifact")
}

fn options(max_duration: Duration) -> RunOptions {
    RunOptions {
        max_duration,
        ..RunOptions::default()
    }
}

fn small_source(frames: Option<u64>) -> SyntheticSource {
    SyntheticSource::new(
        "runtime",
        SourceOptions {
            frames,
            width: 64,
            height: 48,
            ..SourceOptions::default()
        },
    )
}

/// Sink that records each written frame and whether `finish` ran.
#[derive(Default)]
struct RecordingSink {
    frames: Vec<Frame>,
    finished: bool,
}

impl FrameSink for RecordingSink {
    fn write_frame(&mut self, frame: &Frame) -> social_distancing::Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> social_distancing::Result<()> {
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames.len() as u64
    }
}

/// Source whose reads fail after a few frames.
struct FlakySource {
    inner: SyntheticSource,
    fail_after: u64,
    closed: bool,
}

impl FrameSource for FlakySource {
    fn open(&mut self) -> social_distancing::Result<()> {
        self.inner.open()
    }

    fn next_frame(&mut self) -> social_distancing::Result<Option<Frame>> {
        if self.inner.stats().frames_read >= self.fail_after {
            return Err(Error::StreamOpen("device disconnected".to_string()));
        }
        self.inner.next_frame()
    }

    fn fps(&self) -> u32 {
        self.inner.fps()
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.inner.dimensions()
    }

    fn stats(&self) -> social_distancing::ingest::SourceStats {
        self.inner.stats()
    }

    fn close(&mut self) {
        self.closed = true;
        self.inner.close();
    }
}

#[test]
fn wall_clock_cap_ends_an_endless_stream() {
    let cap = Duration::from_millis(200);
    let mut runner = ViolationDetector::new(artifact(0.1), options(cap));
    let mut sink = NullSink::new();
    let started = Instant::now();
    let report = runner
        .run(&mut small_source(None), &mut StubDetector::new(), &mut sink)
        .expect("run");
    assert_eq!(report.end_reason, EndReason::TimeLimit);
    assert!(started.elapsed() >= cap);
    assert!(report.frames_processed > 0);
    assert_eq!(sink.frames_written(), report.frames_processed);
    assert!(sink.is_finished());
    assert_eq!(runner.state(), DetectorState::Finished);
}

#[test]
fn short_stream_ends_before_the_cap() {
    let mut runner = ViolationDetector::new(artifact(0.1), options(Duration::from_secs(30)));
    let report = runner
        .run(&mut small_source(Some(5)), &mut StubDetector::new(), &mut NullSink::new())
        .expect("run");
    assert_eq!(report.end_reason, EndReason::StreamExhausted);
    assert_eq!(report.frames_processed, 5);
    assert!(report.elapsed < Duration::from_secs(30));
}

#[test]
fn detector_failure_skips_one_frame() {
    let people = vec![
        Detection::new(10.0, 10.0, 8.0, 20.0, 0.9),
        Detection::new(20.0, 10.0, 8.0, 20.0, 0.9),
    ];
    let mut detector = ScriptedDetector::new([
        ScriptStep::Detections(people.clone()),
        ScriptStep::Fail("inference timeout".to_string()),
        ScriptStep::Detections(people),
    ]);
    let mut runner = ViolationDetector::new(artifact(0.1), RunOptions::default());
    let mut sink = RecordingSink::default();
    let mut skipped = Vec::new();
    let report = runner
        .run_with_observer(&mut small_source(Some(3)), &mut detector, &mut sink, |frame| {
            skipped.push(frame.skipped)
        })
        .expect("run");

    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.frames_skipped, 1);
    assert_eq!(skipped, vec![false, true, false]);
    assert_eq!(report.total_violations, 2);
    assert_eq!(sink.frames.len(), 3);
    assert!(sink.finished);

    // the skipped frame is written as read, the others are annotated
    let mut fresh = small_source(Some(3));
    fresh.open().expect("open");
    let originals: Vec<Frame> = std::iter::from_fn(|| fresh.next_frame().expect("read")).collect();
    assert_ne!(sink.frames[0], originals[0]);
    assert_eq!(sink.frames[1], originals[1]);
    assert_ne!(sink.frames[2], originals[2]);
}

#[test]
fn unreadable_stream_ends_the_run_and_releases_resources() {
    let mut source = FlakySource {
        inner: small_source(None),
        fail_after: 2,
        closed: false,
    };
    let mut sink = RecordingSink::default();
    let mut runner = ViolationDetector::new(artifact(0.1), RunOptions::default());
    let report = runner
        .run(&mut source, &mut StubDetector::new(), &mut sink)
        .expect("run");
    assert!(matches!(report.end_reason, EndReason::StreamLost(_)));
    assert_eq!(report.frames_processed, 2);
    assert!(source.closed);
    assert!(sink.finished);
}

#[test]
fn source_open_failure_is_fatal_but_still_cleans_up() {
    struct Unopenable;
    impl FrameSource for Unopenable {
        fn open(&mut self) -> social_distancing::Result<()> {
            Err(Error::StreamOpen("no such device".to_string()))
        }
        fn next_frame(&mut self) -> social_distancing::Result<Option<Frame>> {
            Ok(None)
        }
        fn fps(&self) -> u32 {
            1
        }
        fn dimensions(&self) -> Option<(u32, u32)> {
            None
        }
        fn stats(&self) -> social_distancing::ingest::SourceStats {
            Default::default()
        }
    }

    let mut sink = RecordingSink::default();
    let mut runner = ViolationDetector::new(artifact(0.1), RunOptions::default());
    let err = runner
        .run(&mut Unopenable, &mut StubDetector::new(), &mut sink)
        .unwrap_err();
    assert!(matches!(err, Error::StreamOpen(_)));
    assert!(sink.finished);
    assert_eq!(runner.state(), DetectorState::Finished);
}

#[test]
fn timing_log_has_six_columns_and_no_header() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("protagonist.csv");
    std::fs::write(&path, "stale contents from a previous run\n").expect("seed file");

    let mut runner = ViolationDetector::new(artifact(0.1), RunOptions::default());
    let report = runner
        .run(&mut small_source(Some(4)), &mut StubDetector::new(), &mut NullSink::new())
        .expect("run");
    write_timing_log(&path, &report.timings).expect("write log");

    let contents = std::fs::read_to_string(&path).expect("read log");
    let rows: Vec<&str> = contents.lines().collect();
    assert_eq!(rows.len(), 4);
    for row in rows {
        let cells: Vec<f64> = row
            .split(',')
            .map(|c| c.parse().expect("numeric cell"))
            .collect();
        assert_eq!(cells.len(), 6);
        assert!(cells.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn distance_matrix_is_symmetric_with_zero_diagonal() {
    let mut rng = StdRng::seed_from_u64(0x5D15_7A4C);
    for _ in 0..50 {
        let n = rng.gen_range(0..12);
        let detections: Vec<Detection> = (0..n)
            .map(|_| {
                Detection::new(
                    rng.gen_range(0.0..800.0),
                    rng.gen_range(0.0..600.0),
                    rng.gen_range(5.0..80.0),
                    rng.gen_range(10.0..200.0),
                    0.9,
                )
            })
            .collect();
        let scale = rng.gen_range(0.001..0.5);
        let threshold = rng.gen_range(0.5..20.0);
        let analysis =
            compute_violations(&detections, scale, threshold, &DistanceMode::CameraPixels);

        assert_eq!(analysis.distances.len(), n);
        for i in 0..n {
            assert_eq!(analysis.distances.get(i, i), 0.0);
            for j in 0..n {
                assert_eq!(
                    analysis.distances.get(i, j).to_bits(),
                    analysis.distances.get(j, i).to_bits()
                );
                let flagged = analysis.violations.contains(&ViolationPair::new(i, j));
                let expected = i != j && analysis.distances.get(i, j) < threshold;
                assert_eq!(flagged, expected);
            }
        }
    }
}

#[test]
fn frames_without_people_produce_no_violations() {
    let mut runner = ViolationDetector::new(artifact(0.1), RunOptions::default());
    let mut sink = RecordingSink::default();
    let report = runner
        .run(
            &mut small_source(Some(2)),
            &mut ScriptedDetector::constant(Vec::new()),
            &mut sink,
        )
        .expect("run");
    assert_eq!(report.total_violations, 0);
    assert_eq!(report.frames_skipped, 0);
    assert_eq!(sink.frames.len(), 2);
}
