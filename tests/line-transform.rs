use std::collections::VecDeque;

use linepipe::{Command, LineStream, check_output, execute, spawn_async};

fn prefixer() -> Command {
    Command::new("/bin/sh").args(["-c", r#"while IFS= read -r l; do echo "output: $l"; done"#])
}

fn queue(lines: &[&str]) -> VecDeque<String> {
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

#[test]
fn all_three_shapes_agree() {
    let lines = ["1+1", "2^333", "32-32"];
    let expected: Vec<String> = lines.iter().map(|l| format!("output: {}", l)).collect();

    let mut blocking = vec![];
    let status = execute(&prefixer(), &mut queue(&lines), |l| blocking.push(l)).unwrap();
    assert!(status.success());

    let captured = check_output(&prefixer(), &mut queue(&lines)).unwrap();
    assert!(captured.success());

    let (tx, rx) = std::sync::mpsc::channel();
    let pending = spawn_async(prefixer(), queue(&lines), move |l| tx.send(l).unwrap()).unwrap();
    assert!(pending.wait().unwrap().success());
    let background: Vec<String> = rx.iter().collect();

    let mut stream = LineStream::open(&prefixer(), &mut queue(&lines)).unwrap();
    let streamed: Vec<String> = stream.lines().collect();
    assert!(stream.finish().unwrap().success());

    assert_eq!(blocking, expected);
    assert_eq!(captured.lines, expected);
    assert_eq!(background, expected);
    assert_eq!(streamed, expected);
}

#[test]
fn input_without_terminator_is_one_line() {
    let mut input = VecDeque::from(["no newline".to_string()]);
    let captured = check_output(&Command::new("/bin/cat"), &mut input).unwrap();
    assert_eq!(captured.lines, ["no newline"]);
}

#[test]
fn lines_may_be_split_across_writes() {
    let mut input: VecDeque<String> = ["par", "tial\nwho", "le\n"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let captured = check_output(&Command::new("/bin/cat"), &mut input).unwrap();
    assert_eq!(captured.lines, ["partial", "whole"]);
}
