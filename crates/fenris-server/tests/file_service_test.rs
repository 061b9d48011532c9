//! File service behaviour against a real temporary directory.

use std::fs;

use fenris_proto::{Request, Response, ResponseType};
use fenris_server::{CommandHandler, FileService};
use proptest::prelude::*;
use tempfile::TempDir;

fn service() -> (TempDir, FileService) {
    let dir = tempfile::tempdir().unwrap();
    let service = FileService::new(dir.path());
    (dir, service)
}

#[test]
fn read_returns_file_content() {
    let (dir, service) = service();
    fs::write(dir.path().join("test.txt"), "File data").unwrap();

    assert_eq!(service.handle(&Request::read_file("test.txt")), Response::file_content("File data"));
}

#[test]
fn read_missing_file_is_an_error() {
    let (_dir, service) = service();

    let response = service.handle(&Request::read_file("missing.txt"));

    assert!(!response.success);
    assert_eq!(response.kind, ResponseType::Error);
    assert!(String::from_utf8_lossy(&response.data).starts_with("missing.txt: "));
}

#[test]
fn write_creates_and_truncates() {
    let (dir, service) = service();

    assert_eq!(service.handle(&Request::write_file("notes.txt", "first version")), Response::ok());
    assert_eq!(service.handle(&Request::write_file("notes.txt", "v2")), Response::ok());

    assert_eq!(fs::read(dir.path().join("notes.txt")).unwrap(), b"v2");
}

#[test]
fn append_extends_existing_file() {
    let (dir, service) = service();
    fs::write(dir.path().join("log.txt"), "one\n").unwrap();

    assert_eq!(service.handle(&Request::append_file("log.txt", "two\n")), Response::ok());

    assert_eq!(fs::read(dir.path().join("log.txt")).unwrap(), b"one\ntwo\n");
}

#[test]
fn append_to_missing_file_fails() {
    let (dir, service) = service();

    let response = service.handle(&Request::append_file("absent.txt", "data"));

    assert!(!response.success);
    assert!(!dir.path().join("absent.txt").exists());
}

#[test]
fn delete_removes_file() {
    let (dir, service) = service();
    fs::write(dir.path().join("doomed.txt"), "bye").unwrap();

    assert_eq!(service.handle(&Request::delete_file("doomed.txt")), Response::ok());
    assert!(!dir.path().join("doomed.txt").exists());

    assert!(!service.handle(&Request::delete_file("doomed.txt")).success);
}

#[test]
fn info_reports_size_and_kind() {
    let (dir, service) = service();
    fs::write(dir.path().join("data.bin"), [0u8; 42]).unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    assert_eq!(
        service.handle(&Request::info_file("data.bin")),
        Response::file_info("size=42\nkind=file")
    );

    let dir_info = service.handle(&Request::info_file("sub"));
    assert_eq!(dir_info.kind, ResponseType::FileInfo);
    assert!(String::from_utf8_lossy(&dir_info.data).ends_with("kind=dir"));
}

#[test]
fn list_is_sorted_with_directories_marked() {
    let (dir, service) = service();
    fs::write(dir.path().join("b.txt"), "").unwrap();
    fs::write(dir.path().join("a.txt"), "").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(dir.path().join("nested").join("inner.txt"), "").unwrap();

    assert_eq!(
        service.handle(&Request::list_dir("")),
        Response::dir_listing(&["a.txt".to_string(), "b.txt".to_string(), "nested/".to_string()])
    );
    assert_eq!(
        service.handle(&Request::list_dir("nested")),
        Response::dir_listing(&["inner.txt".to_string()])
    );
}

#[test]
fn escaping_the_root_is_rejected() {
    let (dir, service) = service();
    let outside = dir.path().parent().unwrap().join("outside.txt");

    let response = service.handle(&Request::write_file("../outside.txt", "escape"));

    assert!(!response.success);
    assert!(!outside.exists());
}

proptest! {
    #[test]
    fn prop_resolved_paths_stay_under_root(parts in prop::collection::vec("[a-z.]{1,8}", 1..5)) {
        let (dir, service) = service();
        let name = parts.join("/");

        // PROPERTY: anything accepted resolves below the root
        if let Ok(path) = service.resolve(&name) {
            prop_assert!(path.starts_with(dir.path()));
            prop_assert!(!parts.iter().any(|p| p == ".."));
        }
    }
}
