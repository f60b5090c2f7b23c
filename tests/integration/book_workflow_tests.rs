/*!
 * From a novel file on disk to a saved book.
 */

use std::sync::Arc;

use scenecraft::app_config::Config;
use scenecraft::app_controller::Controller;
use scenecraft::library::BookStore;
use scenecraft::pipeline::Pipeline;
use scenecraft::providers::Provider;
use scenecraft::providers::mock::MockProvider;
use tokio_test::{assert_err, assert_ok};

use crate::common::{Scripted, create_temp_dir, create_test_file, init_logging, novel, test_settings};

const NOVEL: &str = "书名：海港\n作者：林青\n\n第一章 归航\n渔船在黄昏时回到港口。\n\n第二章 夜雨\n雨下了一整夜。\n";

fn config_with_books_dir(books_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.media.books_dir = books_dir.to_string_lossy().to_string();
    config
}

#[tokio::test]
async fn test_bookStore_saveRunResult_shouldRoundTripChapters() {
    let dir = create_temp_dir().unwrap();
    let scripted = Scripted::new(2);
    let pipeline = Pipeline::new(scripted.collaborators(), test_settings(2));

    let summary = pipeline.run(novel(2)).await.unwrap();
    let store = BookStore::new(dir.path());
    let entry = assert_ok!(store.save("Harbor", "L. Qing", &summary.chapters));

    assert_eq!(entry.chapters, 2);
    assert_eq!(entry.cover, "/assets/images/ch0_sc0.png");
    assert_eq!(assert_ok!(store.load("Harbor")), summary.chapters);
}

#[tokio::test]
async fn test_controller_run_shouldSaveBookWithMetadata() {
    init_logging();
    let dir = create_temp_dir().unwrap();
    let novel_path = create_test_file(&dir.path().to_path_buf(), "harbor.txt", NOVEL).unwrap();
    let books_dir = dir.path().join("books");

    let provider: Arc<dyn Provider> = Arc::new(MockProvider::working());
    let scripted = Scripted::new(2);
    let controller = Controller::with_collaborators(config_with_books_dir(&books_dir), provider, scripted.collaborators());

    let entry = assert_ok!(controller.run(&novel_path).await);

    assert_eq!(entry.name, "海港");
    assert_eq!(entry.author, "林青");
    assert_eq!(entry.chapters, 2);
    assert!(books_dir.join("海港.json").exists());

    let books = assert_ok!(controller.list_books());
    assert_eq!(books.len(), 1);
    assert_eq!(books[0], entry);
}

#[tokio::test]
async fn test_controller_run_withoutTitle_shouldUseFileStem() {
    let dir = create_temp_dir().unwrap();
    let novel_path = create_test_file(&dir.path().to_path_buf(), "tides.txt", "Chapter 1\nWaves.\n").unwrap();
    let books_dir = dir.path().join("books");

    let provider: Arc<dyn Provider> = Arc::new(MockProvider::working());
    let scripted = Scripted::new(1);
    let controller = Controller::with_collaborators(config_with_books_dir(&books_dir), provider, scripted.collaborators());

    let entry = assert_ok!(controller.run(&novel_path).await);
    assert_eq!(entry.name, "tides");
    assert_eq!(entry.author, "");
    assert_eq!(entry.path, "/books/tides.json");
}

#[tokio::test]
async fn test_controller_run_emptyNovel_shouldFailAndSaveNothing() {
    let dir = create_temp_dir().unwrap();
    let novel_path = create_test_file(&dir.path().to_path_buf(), "empty.txt", "\n\n").unwrap();
    let books_dir = dir.path().join("books");

    let provider: Arc<dyn Provider> = Arc::new(MockProvider::working());
    let scripted = Scripted::new(1);
    let controller = Controller::with_collaborators(config_with_books_dir(&books_dir), provider, scripted.collaborators());

    assert_err!(controller.run(&novel_path).await);
    assert!(assert_ok!(controller.list_books()).is_empty());
}
