/*!
 * Tests for the bubble layout search
 */

use mangatl::app_config::LayoutConfig;
use mangatl::layout::{BubbleLayoutEngine, Rgb};
use mangatl::pipeline::Rect;

#[test]
fn test_fitFrom_withShortSentence_shouldFitInsideBubble() {
    let engine = BubbleLayoutEngine::default();
    let fit = engine.fit_from("Where are you going?", 200.0, 80.0, 20.0);

    assert!(fit.total_height <= 80.0);
    assert!(fit.max_line_width <= 200.0);
    assert!(fit.font_size <= 20.0);
    assert!(!fit.overflow);
}

#[test]
fn test_fit_withEmptyText_shouldProduceNoLines() {
    let engine = BubbleLayoutEngine::default();
    let fit = engine.fit("", 200.0, 80.0);
    assert!(fit.wrapped_lines.is_empty());
    assert_eq!(fit.total_height, 0.0);

    let plan = engine.plan("", Rect::new(0.0, 0.0, 200.0, 80.0), Rgb::BLACK);
    assert!(plan.is_empty());
}

#[test]
fn test_fit_withWordWiderThanBubble_shouldStillPlaceIt() {
    let engine = BubbleLayoutEngine::default();
    let fit = engine.fit("Supercalifragilisticexpialidocious", 30.0, 30.0);

    assert_eq!(fit.font_size, engine.config().min_font_size);
    assert!(fit.overflow);
    assert!(!fit.wrapped_lines.is_empty());
    assert_eq!(fit.wrapped_lines.concat(), "Supercalifragilisticexpialidocious");
}

#[test]
fn test_fit_withTranslatorLineBreaks_shouldKeepThemAsHardBreaks() {
    let engine = BubbleLayoutEngine::default();
    let fit = engine.fit("Run!\nNow!", 300.0, 200.0);
    assert_eq!(fit.wrapped_lines, vec!["Run!", "Now!"]);
}

#[test]
fn test_fit_withLongerText_shouldNeverGrowFont() {
    let engine = BubbleLayoutEngine::default();
    let short = engine.fit("Hey", 150.0, 150.0);
    let long = engine.fit(&"Hey there, listen to me carefully. ".repeat(4), 150.0, 150.0);
    assert!(long.font_size <= short.font_size);
}

#[test]
fn test_fit_withCustomConfig_shouldRespectFontRange() {
    let config = LayoutConfig {
        min_font_size: 14.0,
        max_font_size: 18.0,
        ..LayoutConfig::default()
    };
    let engine = BubbleLayoutEngine::new(config);

    let roomy = engine.fit("OK", 1000.0, 1000.0);
    assert_eq!(roomy.font_size, 18.0);

    let cramped = engine.fit(&"word ".repeat(50), 50.0, 50.0);
    assert_eq!(cramped.font_size, 14.0);
}

#[test]
fn test_fitFrom_withFewAttempts_shouldStillTryIntermediateSizes() {
    let config = LayoutConfig {
        max_attempts: 3,
        ..LayoutConfig::default()
    };
    let engine = BubbleLayoutEngine::new(config);

    // 36px wraps onto two lines and is too tall; 23px fits on one
    let fit = engine.fit_from("Hello there!", 200.0, 80.0, 36.0);
    assert_eq!(fit.font_size, 23.0);
    assert_eq!(fit.wrapped_lines, vec!["Hello there!"]);
    assert!(!fit.overflow);
}

#[test]
fn test_fitFrom_withFewAttempts_shouldEndAtMinimumSize() {
    let config = LayoutConfig {
        max_attempts: 2,
        ..LayoutConfig::default()
    };
    let engine = BubbleLayoutEngine::new(config);

    let cramped = engine.fit_from(&"word ".repeat(40), 60.0, 40.0, 36.0);
    assert_eq!(cramped.font_size, 10.0);
    assert!(cramped.overflow);

    // Coarser steps never pick a size the full search would reject
    let line = "I never said you could come along!!";
    let full = BubbleLayoutEngine::default().fit_from(line, 200.0, 80.0, 36.0);
    let coarse = BubbleLayoutEngine::new(LayoutConfig {
        max_attempts: 3,
        ..LayoutConfig::default()
    })
    .fit_from(line, 200.0, 80.0, 36.0);
    assert!(coarse.font_size <= full.font_size);
    assert!(!coarse.overflow);
}

#[test]
fn test_plan_shouldKeepLinesInsideRegion() {
    let engine = BubbleLayoutEngine::default();
    let region = Rect::new(40.0, 100.0, 240.0, 220.0);
    let plan = engine.plan("I told you not to come here alone.", region, Rgb::WHITE);

    assert!(!plan.overflow);
    assert_eq!(plan.outline, Rgb::BLACK);
    for line in &plan.lines {
        assert!(line.x >= region.x1 && line.x + line.width <= region.x2);
        assert!(line.y >= region.y1 && line.y + plan.line_height <= region.y2);
    }
}
