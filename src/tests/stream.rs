use std::thread;
use std::time::Duration;

use crate::{Command, LineStream};

use super::{input, is_reaped, sh};

#[test]
fn iterate_to_exhaustion() {
    let mut queue = input(&["a\n", "b\n", "c\n"]);
    let mut stream = LineStream::open(&Command::new("/bin/cat"), &mut queue).unwrap();
    assert!(queue.is_empty());
    let mut lines = stream.lines();
    let collected: Vec<String> = lines.by_ref().collect();
    assert_eq!(collected, ["a", "b", "c"]);
    assert!(lines.is_exhausted());
    assert_eq!(lines.next(), None);
    assert!(stream.finish().unwrap().success());
}

#[test]
fn for_loop_over_stream() {
    let mut queue = input(&[
        "12232\n",
        "hello, world\n",
        "Hello, world\n",
        "line: Hello, world!\n",
    ]);
    let mut stream =
        LineStream::open(&Command::new("/bin/grep").args(["-i", "^Hello, world$"]), &mut queue)
            .unwrap();
    let mut received = vec![];
    for line in &mut stream {
        received.push(line);
    }
    assert_eq!(received, ["hello, world", "Hello, world"]);
}

#[test]
fn first_line_is_primed() {
    let mut stream = LineStream::open(&sh("echo first; echo second"), &mut input(&[])).unwrap();
    let mut lines = stream.lines();
    assert!(!lines.is_exhausted());
    assert_eq!(lines.peek(), Some("first"));
    assert_eq!(lines.next().as_deref(), Some("first"));
    assert_eq!(lines.peek(), None);
    assert_eq!(lines.next().as_deref(), Some("second"));
    assert_eq!(lines.next(), None);
    assert!(lines.is_exhausted());
}

#[test]
fn no_output_starts_exhausted() {
    let mut stream = LineStream::open(&Command::new("/bin/true"), &mut input(&[])).unwrap();
    let mut lines = stream.lines();
    assert!(lines.is_exhausted());
    assert_eq!(lines.next(), None);
}

#[test]
fn exhausted_cursors_agree() {
    let mut one = LineStream::open(&Command::new("/bin/true"), &mut input(&[])).unwrap();
    let mut two = LineStream::open(&sh("echo x"), &mut input(&[])).unwrap();
    assert_eq!(two.lines().count(), 1);
    assert!(one.lines().is_exhausted());
    assert!(two.lines().is_exhausted());
}

#[test]
fn single_pass() {
    let mut stream = LineStream::open(&sh("echo a; echo b"), &mut input(&[])).unwrap();
    assert_eq!(stream.lines().next().as_deref(), Some("a"));
    // a fresh cursor picks up where the last one stopped
    assert_eq!(stream.lines().collect::<Vec<_>>(), ["b"]);
    assert!(stream.lines().is_exhausted());
}

#[test]
fn drop_without_reading_reaps() {
    let stream = LineStream::open(&Command::new("/bin/cat"), &mut input(&["x\n"])).unwrap();
    let pid = stream.pid();
    drop(stream);
    assert!(is_reaped(pid));
}

#[test]
fn drop_before_exhaustion_reaps() {
    let mut stream = LineStream::open(&sh("while :; do echo y; done"), &mut input(&[])).unwrap();
    let pid = stream.pid();
    assert_eq!(stream.lines().next().as_deref(), Some("y"));
    drop(stream);
    assert!(is_reaped(pid));
}

#[test]
fn finish_reports_status() {
    let mut stream = LineStream::open(&sh("echo bye; exit 3"), &mut input(&[])).unwrap();
    assert_eq!(stream.lines().collect::<Vec<_>>(), ["bye"]);
    assert_eq!(stream.finish().unwrap().code(), Some(3));
}

#[test]
fn read_after_opening_thread_exits() {
    let opener = thread::spawn(|| {
        let stream = LineStream::open(&sh("sleep 0.5; echo late"), &mut input(&[])).unwrap();
        thread::sleep(Duration::from_millis(100));
        stream
    });
    let mut stream = opener.join().unwrap();
    assert_eq!(stream.lines().collect::<Vec<_>>(), ["late"]);
    assert!(stream.finish().unwrap().success());
}
