//! Drive the binary end to end on local proof files

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

use otskit::armor;
use otskit::ots::{Attestation, DetachedTimestampFile, Op, Timestamp};

fn cmd() -> Command {
    Command::cargo_bin("otskit").unwrap()
}

/// Complete proof for `content`: digest -> append(aa) -> sha256 ->
/// bitcoin attestation
fn complete_proof(content: &[u8]) -> DetachedTimestampFile {
    let mut timestamp = Timestamp::new(sha2_digest(content));
    timestamp
        .add_op(Op::Append(vec![0xaa]))
        .unwrap()
        .add_op(Op::Sha256)
        .unwrap()
        .add_attestation(Attestation::Bitcoin { height: 358391 });
    DetachedTimestampFile::new(Op::Sha256, timestamp)
}

fn sha2_digest(content: &[u8]) -> Vec<u8> {
    otskit::file_utils::hash_bytes(content, &Op::Sha256).unwrap()
}

#[test]
fn info_renders_the_operation_tree() {
    let dir = assert_fs::TempDir::new().unwrap();
    let proof_path = dir.child("hello.txt.ots");
    proof_path
        .write_binary(&complete_proof(b"Hello World!\n").to_vec().unwrap())
        .unwrap();

    cmd()
        .arg("info")
        .arg(proof_path.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "03ba204e50d126e4674c005e04d82e84c21366780af1f43bd54a37816b6ab340",
        ))
        .stdout(predicate::str::contains("append aa"))
        .stdout(predicate::str::contains("verify Bitcoin block 358391"));
}

#[test]
fn info_json_summarizes_attestations() {
    let dir = assert_fs::TempDir::new().unwrap();
    let proof_path = dir.child("hello.txt.ots");
    proof_path
        .write_binary(&complete_proof(b"Hello World!\n").to_vec().unwrap())
        .unwrap();

    let output = cmd()
        .arg("info")
        .arg("--json")
        .arg(proof_path.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["digest_op"], "sha256");
    assert_eq!(summary["complete"], true);
    assert_eq!(summary["attestations"][0]["kind"], "bitcoin");
    assert_eq!(summary["attestations"][0]["height"], 358391);
}

#[test]
fn info_lists_unknown_attestations() {
    let dir = assert_fs::TempDir::new().unwrap();
    let mut timestamp = Timestamp::new(sha2_digest(b"data"));
    timestamp.add_attestation(Attestation::Unknown {
        tag: [1, 2, 3, 4, 5, 6, 7, 8],
        payload: vec![0xff],
    });
    let proof = DetachedTimestampFile::new(Op::Sha256, timestamp);
    let proof_path = dir.child("data.ots");
    proof_path.write_binary(&proof.to_vec().unwrap()).unwrap();

    cmd()
        .arg("info")
        .arg(proof_path.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("0102030405060708"));
}

#[test]
fn verify_without_bitcoin_accepts_a_complete_proof() {
    let dir = assert_fs::TempDir::new().unwrap();
    let target = dir.child("hello.txt");
    target.write_binary(b"Hello World!\n").unwrap();
    let proof_path = dir.child("hello.txt.ots");
    proof_path
        .write_binary(&complete_proof(b"Hello World!\n").to_vec().unwrap())
        .unwrap();

    cmd()
        .arg("verify")
        .arg("--no-bitcoin")
        .arg(proof_path.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("complete"));
}

#[test]
fn verify_rejects_a_tampered_file() {
    let dir = assert_fs::TempDir::new().unwrap();
    let target = dir.child("hello.txt");
    target.write_binary(b"Tampered!\n").unwrap();
    let proof_path = dir.child("hello.txt.ots");
    proof_path
        .write_binary(&complete_proof(b"Hello World!\n").to_vec().unwrap())
        .unwrap();

    cmd()
        .arg("verify")
        .arg("--no-bitcoin")
        .arg(proof_path.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("digest"));
}

#[test]
fn verify_accepts_a_bare_digest() {
    let dir = assert_fs::TempDir::new().unwrap();
    let proof_path = dir.child("hello.txt.ots");
    proof_path
        .write_binary(&complete_proof(b"Hello World!\n").to_vec().unwrap())
        .unwrap();

    cmd()
        .arg("verify")
        .arg("--no-bitcoin")
        .arg("-d")
        .arg("03ba204e50d126e4674c005e04d82e84c21366780af1f43bd54a37816b6ab340")
        .arg(proof_path.path())
        .assert()
        .success();
}

#[test]
fn garbage_proof_fails_with_verification_exit_code() {
    let dir = assert_fs::TempDir::new().unwrap();
    let proof_path = dir.child("junk.ots");
    proof_path.write_binary(b"not a proof").unwrap();

    cmd()
        .arg("info")
        .arg(proof_path.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("magic"));
}

#[test]
fn missing_proof_fails_with_io_exit_code() {
    cmd()
        .arg("info")
        .arg("/nonexistent/path.ots")
        .assert()
        .code(3);
}

#[test]
fn missing_arguments_fail_with_usage_exit_code() {
    cmd().arg("stamp").assert().code(2);
}

#[test]
fn git_extract_splits_commit_and_proof() {
    let dir = assert_fs::TempDir::new().unwrap();

    let commit_text = "tree 0123abcd\nauthor dev <dev@example.org>\n\nship it\n";
    let mut timestamp = Timestamp::new(sha2_digest(commit_text.as_bytes()));
    timestamp.add_attestation(Attestation::Bitcoin { height: 700_000 });
    let mut armored = commit_text.to_string();
    armored.push_str(&armor::armor(&timestamp).unwrap());

    let commit_path = dir.child("COMMIT_EDITMSG");
    commit_path.write_str(&armored).unwrap();

    cmd()
        .arg("git-extract")
        .arg(commit_path.path())
        .assert()
        .success();

    let proof_bytes = std::fs::read(dir.child("COMMIT_EDITMSG.ots").path()).unwrap();
    let proof = DetachedTimestampFile::from_reader(&proof_bytes[..]).unwrap();
    assert_eq!(proof.file_digest(), &sha2_digest(commit_text.as_bytes())[..]);
    assert!(proof.timestamp.is_complete());
}
