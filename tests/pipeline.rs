use std::collections::HashSet;
use std::io::{Read, Write};

use rpipeline::lookup::lookup_stages;
use rpipeline::{
    build, parse_command_line, PipelineBuilder, Stage, StageStatus, Stdin, Stdout,
    EXEC_FAILURE_CODE,
};

const MISSING_PROGRAM: &str = "rpipeline-test-no-such-program";

fn read_all(file: Option<std::fs::File>) -> String {
    let mut out = String::new();
    file.expect("stdout was piped")
        .read_to_string(&mut out)
        .unwrap();
    out
}

#[test]
fn k_stages_use_k_minus_one_pipes_and_k_processes() {
    for k in 1..=5 {
        let stages = (0..k).map(|_| Stage::new("cat"));
        let mut pipeline = PipelineBuilder::new(stages)
            .stdin(Stdin::Null)
            .stdout(Stdout::Null)
            .build()
            .unwrap();

        assert_eq!(pipeline.pipe_count(), k - 1);
        assert_eq!(pipeline.pids().len(), k);
        let distinct: HashSet<_> = pipeline.pids().iter().collect();
        assert_eq!(distinct.len(), k);

        let statuses = pipeline.wait().unwrap();
        assert_eq!(statuses.len(), k);
        assert!(statuses.iter().all(StageStatus::success));
    }
}

#[test]
fn cat_into_grep_keeps_matching_line() {
    let mut pipeline = PipelineBuilder::new([Stage::new("cat"), Stage::new("grep").arg("b")])
        .stdin(Stdin::Piped)
        .stdout(Stdout::Piped)
        .build()
        .unwrap();

    let mut input = pipeline.take_stdin().unwrap();
    input.write_all(b"a\nb\nc\n").unwrap();
    drop(input);

    let output = read_all(pipeline.take_stdout());
    let statuses = pipeline.wait().unwrap();

    assert_eq!(output, "b\n");
    assert_eq!(statuses, [StageStatus::Exited(0), StageStatus::Exited(0)]);
}

#[test]
fn wait_closes_an_untaken_stdin() {
    let mut pipeline = PipelineBuilder::new([Stage::new("cat")])
        .stdin(Stdin::Piped)
        .stdout(Stdout::Null)
        .build()
        .unwrap();

    // would block forever if the writer stayed open
    let statuses = pipeline.wait().unwrap();
    assert!(statuses[0].success());
}

#[test]
fn missing_program_fails_only_its_stage() {
    let mut pipeline = PipelineBuilder::new([
        Stage::new("echo").arg("x"),
        Stage::new(MISSING_PROGRAM),
    ])
    .stdout(Stdout::Null)
    .build()
    .expect("exec failure must not fail the build");

    let statuses = pipeline.wait().unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[1], StageStatus::Exited(EXEC_FAILURE_CODE));
    // echo may lose the race against the reader exiting; that is SIGPIPE,
    // not a failure of its own
    assert!(
        statuses[0].success() || statuses[0].is_broken_pipe(),
        "unexpected echo status {}",
        statuses[0]
    );
}

#[test]
fn missing_first_program_gives_downstream_eof() {
    let mut pipeline = PipelineBuilder::new([Stage::new(MISSING_PROGRAM), Stage::new("cat")])
        .stdout(Stdout::Piped)
        .build()
        .unwrap();

    let output = read_all(pipeline.take_stdout());
    let statuses = pipeline.wait().unwrap();

    assert_eq!(output, "");
    assert_eq!(
        statuses,
        [StageStatus::Exited(EXEC_FAILURE_CODE), StageStatus::Exited(0)]
    );
}

#[test]
fn wait_twice_returns_same_statuses() {
    let mut pipeline = build([
        Stage::new("sh").args(["-c", "exit 3"]),
        Stage::new("sh").args(["-c", "exit 5"]),
    ])
    .unwrap();

    let first = pipeline.wait().unwrap();
    let second = pipeline.wait().unwrap();

    assert_eq!(first, [StageStatus::Exited(3), StageStatus::Exited(5)]);
    assert_eq!(first, second);
    assert_eq!(pipeline.statuses(), Some(first));
}

#[test]
fn single_stage_passes_streams_through() {
    let mut pipeline = PipelineBuilder::new([Stage::new("tr").args(["a-z", "A-Z"])])
        .stdin(Stdin::Piped)
        .stdout(Stdout::Piped)
        .build()
        .unwrap();
    assert_eq!(pipeline.pipe_count(), 0);

    pipeline.take_stdin().unwrap().write_all(b"hello\n").unwrap();
    assert_eq!(read_all(pipeline.take_stdout()), "HELLO\n");
    assert!(pipeline.wait().unwrap()[0].success());
}

#[test]
fn long_chain_reaches_end_of_stream() {
    // every intermediate stage only exits once all write ends upstream are
    // closed; a leaked descriptor anywhere hangs this test
    let mut pipeline = PipelineBuilder::new([
        Stage::new("printf").arg("one\ntwo\nthree\n"),
        Stage::new("cat"),
        Stage::new("cat"),
        Stage::new("cat"),
        Stage::new("wc").arg("-l"),
    ])
    .stdout(Stdout::Piped)
    .build()
    .unwrap();

    let output = read_all(pipeline.take_stdout());
    assert_eq!(output.trim(), "3");
    assert!(pipeline.wait().unwrap().iter().all(StageStatus::success));
}

#[test]
fn early_exit_downstream_breaks_the_pipe_upstream() {
    // `yes` never stops on its own; it must die of SIGPIPE once head exits
    let mut pipeline = PipelineBuilder::new([Stage::new("yes"), Stage::new("head").args(["-n", "2"])])
        .stdout(Stdout::Piped)
        .build()
        .unwrap();

    assert_eq!(read_all(pipeline.take_stdout()), "y\ny\n");
    let statuses = pipeline.wait().unwrap();
    assert!(statuses[0].is_broken_pipe(), "yes ended with {}", statuses[0]);
    assert!(statuses[1].success());
}

#[test]
fn file_redirects_from_parsed_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    std::fs::write(&input, "pear\napple\npear\n").unwrap();

    let line = parse_command_line(&format!(
        "sort < {} | uniq > {}",
        input.display(),
        output.display()
    ))
    .unwrap();
    let mut pipeline = PipelineBuilder::new(line.stages)
        .stdin(line.stdin)
        .stdout(line.stdout)
        .build()
        .unwrap();
    assert!(pipeline.wait().unwrap().iter().all(StageStatus::success));

    assert_eq!(std::fs::read_to_string(&output).unwrap(), "apple\npear\n");
}

#[test]
fn append_redirect_keeps_previous_runs() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("log.txt");

    for word in ["first", "second"] {
        let mut pipeline = PipelineBuilder::new([Stage::new("echo").arg(word)])
            .stdout(Stdout::Append(output.clone()))
            .build()
            .unwrap();
        pipeline.wait().unwrap();
    }

    assert_eq!(std::fs::read_to_string(&output).unwrap(), "first\nsecond\n");
}

#[test]
fn dropping_an_unwaited_pipeline_reaps_it() {
    let pids = {
        let pipeline = PipelineBuilder::new([Stage::new("true"), Stage::new("true")])
            .stdin(Stdin::Null)
            .build()
            .unwrap();
        pipeline.pids().to_vec()
    };

    for pid in pids {
        // already reaped: the kernel no longer knows it as our child
        let err = nix::sys::wait::waitpid(pid, None).unwrap_err();
        assert_eq!(err, nix::errno::Errno::ECHILD);
    }
}

#[test]
fn dropping_with_unread_stdout_does_not_hang() {
    // `yes` only stops once its reader is gone; drop must close the piped
    // stdout before reaping
    let pid = {
        let pipeline = PipelineBuilder::new([Stage::new("yes")])
            .stdin(Stdin::Null)
            .stdout(Stdout::Piped)
            .build()
            .unwrap();
        pipeline.pids()[0]
    };

    let err = nix::sys::wait::waitpid(pid, None).unwrap_err();
    assert_eq!(err, nix::errno::Errno::ECHILD);
}

#[test]
fn phonebook_lookup_prints_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let phonebook = dir.path().join("phonebook.txt");
    std::fs::write(
        &phonebook,
        "Nezer Zaidenberg,054-5531415\nSheva Bat,052-1112233\nNezer Cohen,050-0000001\n",
    )
    .unwrap();

    let mut pipeline = PipelineBuilder::new(lookup_stages("Nezer", &phonebook).unwrap())
        .stdout(Stdout::Piped)
        .build()
        .unwrap();

    let output = read_all(pipeline.take_stdout());
    let statuses = pipeline.wait().unwrap();

    assert_eq!(output, "054-5531415\n050-0000001\n");
    assert_eq!(statuses.len(), 4);
    assert!(statuses.iter().all(StageStatus::success));
}

#[test]
fn phonebook_lookup_without_match_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let phonebook = dir.path().join("phonebook.txt");
    std::fs::write(&phonebook, "Sheva Bat,052-1112233\n").unwrap();

    let mut pipeline = PipelineBuilder::new(lookup_stages("Nobody", &phonebook).unwrap())
        .stdout(Stdout::Piped)
        .build()
        .unwrap();

    assert_eq!(read_all(pipeline.take_stdout()), "");
    let statuses = pipeline.wait().unwrap();
    // grep exits 1 on no match, the rest see an empty stream
    assert_eq!(statuses[0], StageStatus::Exited(1));
    assert!(statuses[1..].iter().all(StageStatus::success));
}
