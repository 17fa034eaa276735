use anyhow::Result;
use docqa_retriever::retrieval::{
    extract::{extract_text, process_file_content},
    scanner::scan_documents,
};
use tempfile::tempdir;

const TWO_PAGE_PDF: &[u8] = include_bytes!("fixtures/two_pages.pdf");

#[test]
fn test_pdf_pages_come_out_in_order() -> Result<()> {
    let text = extract_text("report.pdf", TWO_PAGE_PDF)?;

    let first = text.find("radiology").expect("first page text missing");
    let second = text.find("privacy").expect("second page text missing");
    assert!(first < second, "pages out of order: {text:?}");
    assert!(text.contains("First page"));
    assert!(text.contains("Second page"));
    Ok(())
}

#[test]
fn test_pdf_in_documents_directory() -> Result<()> {
    let dir = tempdir()?;
    std::fs::write(dir.path().join("report.PDF"), TWO_PAGE_PDF)?;
    std::fs::write(dir.path().join("table.csv"), "a,b\n\nc,d\n")?;

    let snapshot = scan_documents(dir.path())?;
    let names: Vec<&str> = snapshot.documents.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["report.PDF", "table.csv"]);
    assert!(snapshot.documents[0].text.contains("privacy"));
    assert_eq!(snapshot.documents[1].text, "a, b\n\nc, d");

    assert_eq!(
        process_file_content("report.pdf", TWO_PAGE_PDF),
        Some(extract_text("report.pdf", TWO_PAGE_PDF)?)
    );
    Ok(())
}
