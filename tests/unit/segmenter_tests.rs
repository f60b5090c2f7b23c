/*!
 * Tests for chapter segmentation on realistic novel layouts
 */

use scenecraft::pipeline::records::SourceText;
use scenecraft::pipeline::stages::Segmenter;
use scenecraft::segmenter::{ChapterSegmenter, extract_author, extract_book_title, split_chapters};

const SERIAL: &str = "《青云志》\n作者：无名\n\n简介：一个少年的修行之路。\n\n\
第一回 少年\n山下有个小村子。\n村里住着一个少年。\n\n\
第二回 拜师\n少年上山拜师。\n\n\
第三回 下山\n三年后，少年下山了。\n";

#[test]
fn test_splitChapters_huiHeadings_shouldKeepChapterBodies() {
    let chapters = split_chapters(SERIAL);

    assert_eq!(chapters.len(), 3);
    assert_eq!(chapters[0], "第一回 少年\n山下有个小村子。\n村里住着一个少年。");
    assert!(chapters[2].ends_with("三年后，少年下山了。"));
    assert!(chapters.iter().all(|c| !c.contains("简介")));
}

#[test]
fn test_splitChapters_arabicNumerals_shouldSplit() {
    let text = "第1章 开始\n内容一\n第2章 继续\n内容二\n第10章 结束\n内容三";
    let chapters = split_chapters(text);

    assert_eq!(chapters.len(), 3);
    assert!(chapters[2].starts_with("第10章"));
}

#[test]
fn test_splitChapters_windowsLineEndings_shouldSplit() {
    let text = "Chapter 1\r\nFirst.\r\n\r\nChapter 2\r\nSecond.\r\n";
    let chapters = split_chapters(text);

    assert_eq!(chapters, vec!["Chapter 1\nFirst.", "Chapter 2\nSecond."]);
}

#[test]
fn test_splitChapters_plainProse_shouldNeverBeEmpty() {
    let prose = "It rained all week. Nobody came to the harbor, and the boats stayed tied up.";
    let chapters = split_chapters(prose);

    assert_eq!(chapters, vec![prose.to_string()]);
}

#[tokio::test]
async fn test_chapterSegmenter_shouldIndexChaptersFromZero() {
    let chapters = ChapterSegmenter::new()
        .segment(&SourceText::new("serial.txt", SERIAL))
        .await
        .unwrap();

    let indices: Vec<usize> = chapters.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn test_extractMetadata_serialHeader_shouldFindTitleAndAuthor() {
    assert_eq!(extract_book_title(SERIAL), "青云志");
    assert_eq!(extract_author(SERIAL), "无名");
}

#[test]
fn test_extractBookTitle_labelBeatsBrackets() {
    let text = "书名：海港\n他读过《另一本书》。";
    assert_eq!(extract_book_title(text), "海港");
}
