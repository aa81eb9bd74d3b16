use std::path::Path;

use assert_cmd::Command;
use calamine::{open_workbook_auto, Data, Reader};
use predicates::prelude::*;
use rust_xlsxwriter::Workbook;

fn tally(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("receipt-tally").unwrap();
    cmd.env("HOME", home)
        .env_remove("GEMINI_API_KEY")
        .env_remove("OPENAI_API_KEY");
    cmd
}

fn write_template(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("교통비내역").unwrap();
    for (col, title) in ["영수증번호", "사용일자", "직원명", "업무내용", "출발-도착", "사용요금", "비고"]
        .iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, *title).unwrap();
    }
    workbook.save(path).unwrap();
}

fn write_text_files(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("교통비내역.txt"),
        "영수증번호\t사용일자\t직원명\t업무내용\t출발-도착\t사용요금\t비고\n\
         A\t7월 22일\t손근영\t야근\t회사-집\t12700\t\n",
    )
    .unwrap();
    std::fs::write(dir.join("직원별합계.txt"), "직원명\t총액\n손근영\t12,700원\n").unwrap();
}

#[test]
fn test_help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    tally(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("excel"))
        .stdout(predicate::str::contains("roster"));
}

#[test]
fn test_excel_builds_workbook_from_text_files() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    write_template(&template);
    let text_dir = dir.path().join("텍스트결과");
    write_text_files(&text_dir);
    let output = dir.path().join("교통비_결과.xlsx");

    tally(dir.path())
        .arg("excel")
        .arg("--text-dir")
        .arg(&text_dir)
        .arg("--template")
        .arg(&template)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    let mut workbook = open_workbook_auto(&output).unwrap();
    let details = workbook.worksheet_range("교통비내역").unwrap();
    assert_eq!(details.get_value((1, 0)), Some(&Data::String("A".to_string())));
    assert_eq!(details.get_value((1, 2)), Some(&Data::String("손근영".to_string())));
    let summary = workbook.worksheet_range("직원별 사용금액").unwrap();
    assert_eq!(summary.get_value((0, 0)), Some(&Data::String("적요".to_string())));
    assert_eq!(summary.get_value((1, 0)), Some(&Data::String("교통비".to_string())));
    assert_eq!(summary.get_value((1, 2)), Some(&Data::String("12,700원".to_string())));
}

#[test]
fn test_excel_refuses_to_overwrite_template() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    write_template(&template);
    let text_dir = dir.path().join("text");
    write_text_files(&text_dir);

    tally(dir.path())
        .arg("excel")
        .arg("--text-dir")
        .arg(&text_dir)
        .arg("--template")
        .arg(&template)
        .arg("--output")
        .arg(&template)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_run_with_no_images_fails() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.xlsx");
    write_template(&template);
    let images = dir.path().join("images");
    std::fs::create_dir(&images).unwrap();
    std::fs::write(images.join("notes.txt"), "not a receipt").unwrap();

    tally(dir.path())
        .arg("run")
        .arg(&images)
        .arg("--out")
        .arg(dir.path().join("out"))
        .arg("--template")
        .arg(&template)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No receipt images found"));
}

#[test]
fn test_run_without_template_fails() {
    let dir = tempfile::tempdir().unwrap();
    tally(dir.path())
        .arg("run")
        .arg(dir.path())
        .arg("--out")
        .arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("No template workbook"));
}

#[test]
fn test_batch_creates_missing_folder() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("receipts");

    tally(dir.path())
        .arg("batch")
        .arg(&images)
        .assert()
        .success()
        .stdout(predicate::str::contains("Put receipt images in it"));
    assert!(images.is_dir());
}

#[test]
fn test_batch_on_folder_without_images_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("receipts");
    std::fs::create_dir(&images).unwrap();
    std::fs::write(images.join("memo.txt"), "not a receipt").unwrap();

    tally(dir.path())
        .arg("batch")
        .arg(&images)
        .assert()
        .success()
        .stdout(predicate::str::contains("No receipt images"));
}

#[test]
fn test_roster_edits_persist() {
    let home = tempfile::tempdir().unwrap();

    tally(home.path()).args(["roster", "add", "홍길동"]).assert().success();
    tally(home.path())
        .args(["roster", "initials", "gd", "홍길동"])
        .assert()
        .success()
        .stdout(predicate::str::contains("GD -> 홍길동"));
    tally(home.path())
        .args(["roster", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("홍길동"))
        .stdout(predicate::str::contains("GD"));
    tally(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("23 names, 11 initials"));

    tally(home.path())
        .args(["roster", "remove", "없는사람"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not on the roster"));
}

#[test]
fn test_config_set_model() {
    let home = tempfile::tempdir().unwrap();
    tally(home.path())
        .args(["config", "set-model", "gemini-2.5-pro"])
        .assert()
        .success();
    tally(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("gemini-2.5-pro"));
}

#[test]
fn test_config_set_provider_switches_model() {
    let home = tempfile::tempdir().unwrap();
    tally(home.path())
        .args(["config", "set-provider", "openai"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider set to openai (model gpt-4o)"));
    tally(home.path())
        .args(["config", "set-model", "gpt-4o-mini"])
        .assert()
        .success();
    tally(home.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("openai"))
        .stdout(predicate::str::contains("gpt-4o-mini"))
        .stdout(predicate::str::contains("gemini-2.5-flash"));
    tally(home.path())
        .args(["config", "set-provider", "claude"])
        .assert()
        .failure();
}
