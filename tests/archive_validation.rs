mod common;

use common::zip_archive;
use rstest::rstest;
use scriptbox::archive::{ArchiveLimits, ArchiveValidator, validate_archive};
use scriptbox::exec::{SandboxError, Violation};

fn workbook() -> Vec<u8> {
    let sheet = "<row><c>acme</c><c>3</c></row>".repeat(20);
    zip_archive(
        &[
            ("[Content_Types].xml", b"<Types/>".as_slice()),
            ("xl/workbook.xml", b"<workbook/>".as_slice()),
            ("xl/worksheets/sheet1.xml", sheet.as_bytes()),
        ],
        zip::CompressionMethod::Deflated,
    )
}

#[test]
fn realistic_workbook_is_accepted() {
    let stats = ArchiveValidator::default().validate(&workbook()).unwrap();
    assert_eq!(stats.entries, 3);
    assert!(stats.ratio() < 50.0, "ratio was {}", stats.ratio());
}

#[test]
fn highly_compressible_payload_is_a_bomb() {
    let zeros = vec![0u8; 10 * 1024 * 1024];
    let bytes = zip_archive(
        &[("xl/worksheets/sheet1.xml", zeros.as_slice())],
        zip::CompressionMethod::Deflated,
    );
    let err = validate_archive(&bytes, 50.0).unwrap_err();
    assert!(matches!(
        err,
        SandboxError::Violation(Violation::CompressionRatio { .. })
    ));
    assert_eq!(err.user_message(), "file too large or corrupt");
}

#[rstest]
#[case::strict(1.0, false)]
#[case::lenient(10_000.0, true)]
fn ratio_threshold_is_configurable(#[case] max_ratio: f64, #[case] accepted: bool) {
    let bytes = workbook();
    assert_eq!(validate_archive(&bytes, max_ratio).is_ok(), accepted);
}

#[test]
fn size_cap_applies_even_with_a_low_ratio() {
    let data = vec![7u8; 8192];
    let bytes = zip_archive(&[("data.bin", data.as_slice())], zip::CompressionMethod::Stored);
    let validator = ArchiveValidator::new(ArchiveLimits {
        max_uncompressed_bytes: 4096,
        ..ArchiveLimits::default()
    });
    assert!(matches!(
        validator.validate(&bytes),
        Err(SandboxError::Violation(Violation::UncompressedSize { .. }))
    ));
}

#[test]
fn non_archive_is_malformed() {
    let err = validate_archive(b"%PDF-1.7\n", 50.0).unwrap_err();
    assert!(matches!(
        err,
        SandboxError::Violation(Violation::MalformedArchive(_))
    ));
}
