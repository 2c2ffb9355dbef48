//! Integration tests for the fully wired engine: PDF paging, vector-file
//! persistence across restarts, and watcher-driven rescans.

use docdex::{Config, Engine};
use lopdf::{dictionary, Object, Stream, StringFormat};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn test_config(model_path: &Path) -> Config {
    Config {
        model_path: model_path.to_path_buf(),
        chunk_size: 512,
        debounce_ms: 100,
        log_level: "warn".to_string(),
    }
}

fn db_conn(model_path: &Path) -> Connection {
    Connection::open(model_path.join("localdocs_v2.db")).unwrap()
}

/// Build a small PDF with one line of text per page.
fn write_pdf(path: &Path, pages: &[&str], title: &str) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = lopdf::content::Content {
            operations: vec![
                lopdf::content::Operation::new("BT", vec![]),
                lopdf::content::Operation::new("Tf", vec!["F1".into(), 24.into()]),
                lopdf::content::Operation::new("Td", vec![72.into(), 700.into()]),
                lopdf::content::Operation::new("Tj", vec![Object::string_literal(*text)]),
                lopdf::content::Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = pages.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::String(title.as_bytes().to_vec(), StringFormat::Literal),
        "Author" => Object::String(b"Test Author".to_vec(), StringFormat::Literal),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);
    doc.save(path).unwrap();
}

#[tokio::test]
async fn pdf_chunks_carry_page_numbers_and_metadata() {
    let model_dir = tempfile::tempdir().unwrap();
    let corpus = tempfile::tempdir().unwrap();
    write_pdf(
        &corpus.path().join("report.pdf"),
        &[
            "first page about alpine lakes",
            "second page about glacial valleys",
            "third page about mountain passes",
        ],
        "Alpine Survey",
    );

    let engine = Engine::start(test_config(model_dir.path())).unwrap();
    let folder = corpus.path().canonicalize().unwrap();
    engine.handle().add_folder("geo", &folder).await.unwrap();
    engine.handle().wait_idle().await.unwrap();

    let conn = db_conn(model_dir.path());
    let mut stmt = conn
        .prepare("SELECT DISTINCT page FROM chunks ORDER BY page")
        .unwrap();
    let pages: Vec<i64> = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(pages, vec![1, 2, 3]);

    let (title, author, file): (String, String, String) = conn
        .query_row(
            "SELECT title, author, file FROM chunks LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(title, "Alpine Survey");
    assert_eq!(author, "Test Author");
    assert_eq!(file, "report.pdf");

    engine.handle().shutdown().await;
}

#[tokio::test]
async fn restart_loads_vectors_and_serves_vector_queries() {
    let model_dir = tempfile::tempdir().unwrap();
    let corpus = tempfile::tempdir().unwrap();
    std::fs::write(
        corpus.path().join("a.txt"),
        "the library opens at dawn",
    )
    .unwrap();
    std::fs::write(
        corpus.path().join("b.txt"),
        "the harbor closes at dusk",
    )
    .unwrap();
    let folder = corpus.path().canonicalize().unwrap();

    // first run: index and persist
    {
        let engine = Engine::start(test_config(model_dir.path())).unwrap();
        engine.handle().add_folder("places", &folder).await.unwrap();
        engine.handle().wait_idle().await.unwrap();
        engine.handle().shutdown().await;
    }

    assert!(model_dir.path().join("embeddings_v2.json").exists());

    // every chunk reached the vector index before shutdown
    {
        let conn = db_conn(model_dir.path());
        let unembedded: i64 = conn
            .query_row(
                "SELECT count(*) FROM chunks WHERE has_embedding = 0",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(unembedded, 0);
    }

    // second run: the vector file loads at startup, enabling the dense path
    let engine = Engine::start(test_config(model_dir.path())).unwrap();
    engine.handle().wait_idle().await.unwrap();

    let hits = engine
        .handle()
        .retrieve(
            &["places".to_string()],
            "the library opens at dawn",
            1,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "the library opens at dawn");
    assert_eq!(hits[0].file, "a.txt");

    engine.handle().shutdown().await;
}

#[tokio::test]
async fn watcher_triggers_cleanup_and_rescan() {
    let model_dir = tempfile::tempdir().unwrap();
    let corpus = tempfile::tempdir().unwrap();
    let file = corpus.path().join("note.txt");
    std::fs::write(&file, "the original wording").unwrap();
    let folder = corpus.path().canonicalize().unwrap();

    let engine = Engine::start(test_config(model_dir.path())).unwrap();
    engine.handle().add_folder("notes", &folder).await.unwrap();
    engine.handle().wait_idle().await.unwrap();

    std::fs::write(&file, "the replacement wording").unwrap();
    let handle = std::fs::File::options().write(true).open(&file).unwrap();
    handle
        .set_modified(std::time::SystemTime::now() + Duration::from_secs(3))
        .unwrap();
    drop(handle);

    // the change notification is debounced, then cleanup + rescan run
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut texts: Vec<String> = Vec::new();
    while std::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(250)).await;
        let conn = db_conn(model_dir.path());
        let mut stmt = conn
            .prepare("SELECT chunk_text FROM chunks ORDER BY chunk_id")
            .unwrap();
        texts = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        if texts == vec!["the replacement wording".to_string()] {
            break;
        }
    }
    assert_eq!(texts, vec!["the replacement wording".to_string()]);

    engine.handle().shutdown().await;
}

#[tokio::test]
async fn status_reports_statistics() {
    let model_dir = tempfile::tempdir().unwrap();
    let corpus = tempfile::tempdir().unwrap();
    std::fs::write(corpus.path().join("a.txt"), "one two three four").unwrap();

    let engine = Engine::start(test_config(model_dir.path())).unwrap();
    let folder = corpus.path().canonicalize().unwrap();
    engine.handle().add_folder("stats", &folder).await.unwrap();
    engine.handle().wait_idle().await.unwrap();

    let progress = engine.handle().collections().await.unwrap();
    let entry = progress.iter().find(|p| p.collection == "stats").unwrap();
    assert_eq!(entry.total_docs, 1);
    assert_eq!(entry.total_words, 4);
    assert_eq!(entry.total_tokens, 0);
    assert_eq!(entry.folder_path, PathBuf::from(&folder));

    engine.handle().shutdown().await;
}
