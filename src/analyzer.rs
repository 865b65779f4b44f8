//! Static design analysis over collected markup and styles.
//!
//! Analysis is infallible: every signal extractor tolerates missing or
//! malformed input and falls back to an empty or default value, so a run is
//! never aborted by one unparsable page.

use scraper::{Html, Selector};

use crate::models::{LayoutStructure, PerformanceMetrics, SemanticAnalysis};

/// Everything the analyzer derives from one page. Performance metrics are
/// carried through from collection rather than derived here.
#[derive(Debug, Clone, Default)]
pub struct DesignAnalysis {
    pub color_palette: Vec<String>,
    pub font_families: Vec<String>,
    pub layout: LayoutStructure,
    pub semantic: SemanticAnalysis,
    pub accessibility_score: u8,
    pub design_score: u8,
    pub mobile_responsive: bool,
    pub confidence_score: f64,
}

const MAX_COLORS: usize = 10;
const MAX_FONTS: usize = 5;

pub fn analyze(html: &str, css: &str, performance: &PerformanceMetrics) -> DesignAnalysis {
    let document = Html::parse_document(html);

    let color_palette = extract_colors(css);
    let font_families = extract_fonts(css);
    let layout = extract_layout(&document, html, css);
    let semantic = extract_semantic(&document);
    let mobile_responsive = has_viewport_meta(&document) || css.contains("@media");

    let accessibility_score = accessibility_score(html, &document);
    let design_score = design_score(&color_palette, &font_families, &layout, mobile_responsive);
    let confidence_score = confidence(
        &color_palette,
        &font_families,
        &layout,
        &semantic,
        performance,
    );

    DesignAnalysis {
        color_palette,
        font_families,
        layout,
        semantic,
        accessibility_score,
        design_score,
        mobile_responsive,
        confidence_score,
    }
}

fn select(document: &Html, selector: &str) -> usize {
    match Selector::parse(selector) {
        Ok(sel) => document.select(&sel).count(),
        Err(_) => 0,
    }
}

/// Scan a stylesheet for color tokens: `#rgb`, `#rrggbb`, `rgb(...)` and
/// `rgba(...)`. Lowercased, deduplicated in first-seen order, capped.
pub fn extract_colors(css: &str) -> Vec<String> {
    let mut colors = Vec::new();
    let bytes = css.as_bytes();
    let mut i = 0;

    let mut push = |token: String| {
        if colors.len() < MAX_COLORS && !colors.contains(&token) {
            colors.push(token);
        }
    };

    while i < bytes.len() {
        match bytes[i] {
            b'#' => {
                let hex: String = css[i + 1..]
                    .chars()
                    .take_while(|c| c.is_ascii_hexdigit())
                    .collect();
                if hex.len() == 3 || hex.len() == 6 {
                    push(format!("#{}", hex.to_lowercase()));
                }
                i += 1 + hex.len();
            }
            b'r' if css[i..].starts_with("rgb") => {
                let rest = &css[i..];
                let prefix_len = if rest.starts_with("rgba(") {
                    5
                } else if rest.starts_with("rgb(") {
                    4
                } else {
                    i += 1;
                    continue;
                };
                if let Some(close) = rest.find(')') {
                    let token: String = rest[..close + 1].split_whitespace().collect();
                    push(token.to_lowercase());
                    i += close + 1;
                } else {
                    i += prefix_len;
                }
            }
            _ => i += 1,
        }
    }

    colors
}

/// Collect font names from `font-family` declarations. Quotes stripped,
/// deduplicated in first-seen order, capped.
pub fn extract_fonts(css: &str) -> Vec<String> {
    let mut fonts = Vec::new();
    for (idx, _) in css.match_indices("font-family") {
        let rest = &css[idx..];
        let Some(colon) = rest.find(':') else { continue };
        let end = rest.find([';', '}']).unwrap_or(rest.len());
        if end <= colon {
            continue;
        }
        for name in rest[colon + 1..end].split(',') {
            let name = name.trim().trim_matches(['"', '\'']).trim();
            if name.is_empty() {
                continue;
            }
            let name = name.to_string();
            if fonts.len() < MAX_FONTS && !fonts.contains(&name) {
                fonts.push(name);
            }
        }
    }
    fonts
}

/// Region detection accepts either the semantic tag or the class-name
/// convention; grid/flex detection looks at both the stylesheet and inline
/// `style=` attributes carried in the markup.
fn extract_layout(document: &Html, html: &str, css: &str) -> LayoutStructure {
    LayoutStructure {
        has_header: select(document, r#"header, [class*="header"]"#) > 0,
        has_nav: select(document, r#"nav, [class*="nav"]"#) > 0,
        has_footer: select(document, r#"footer, [class*="footer"]"#) > 0,
        uses_grid: display_mentions(html, css, "grid"),
        uses_flexbox: display_mentions(html, css, "flex"),
        section_count: select(document, "section") as u32,
    }
}

fn display_mentions(html: &str, css: &str, value: &str) -> bool {
    let compact = format!("display:{}", value);
    let spaced = format!("display: {}", value);
    css.contains(&compact)
        || css.contains(&spaced)
        || html.contains(&compact)
        || html.contains(&spaced)
}

fn extract_semantic(document: &Html) -> SemanticAnalysis {
    let title = Selector::parse("title").ok().and_then(|sel| {
        document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let meta_content = |name: &str| -> Option<String> {
        let sel = Selector::parse(&format!("meta[name=\"{}\"]", name)).ok()?;
        document
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    };

    let description = meta_content("description");
    let keywords = meta_content("keywords")
        .map(|raw| {
            raw.split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut heading_counts = [0u32; 6];
    for (level, slot) in heading_counts.iter_mut().enumerate() {
        *slot = select(document, &format!("h{}", level + 1)) as u32;
    }

    SemanticAnalysis {
        title,
        description,
        keywords,
        heading_counts,
    }
}

fn has_viewport_meta(document: &Html) -> bool {
    select(document, "meta[name=\"viewport\"]") > 0
}

/// Base 50, plus fixed increments per accessibility signal, clamped to 100.
fn accessibility_score(html: &str, document: &Html) -> u8 {
    let mut score: u32 = 50;
    if html.contains("alt=") {
        score += 15;
    }
    if html.contains("aria-") {
        score += 15;
    }
    if select(document, "label") > 0 {
        score += 10;
    }
    if select(document, "html[lang]") > 0 {
        score += 10;
    }
    score.min(100) as u8
}

/// Base 40, plus fixed increments per design signal, clamped to 100.
fn design_score(
    colors: &[String],
    fonts: &[String],
    layout: &LayoutStructure,
    mobile_responsive: bool,
) -> u8 {
    let mut score: u32 = 40;
    if colors.len() >= 3 {
        score += 15;
    }
    if fonts.len() >= 2 {
        score += 15;
    }
    if mobile_responsive {
        score += 15;
    }
    let semantic_regions = [layout.has_header, layout.has_nav, layout.has_footer]
        .iter()
        .filter(|present| **present)
        .count();
    score += (semantic_regions as u32) * 5;
    score.min(100) as u8
}

/// Fraction of analysis signals that yielded a non-empty value.
fn confidence(
    colors: &[String],
    fonts: &[String],
    layout: &LayoutStructure,
    semantic: &SemanticAnalysis,
    performance: &PerformanceMetrics,
) -> f64 {
    let signals = [
        !colors.is_empty(),
        !fonts.is_empty(),
        layout.has_header || layout.has_nav || layout.has_footer,
        semantic.title.is_some(),
        semantic.heading_counts.iter().any(|count| *count > 0),
        performance.content_size_bytes > 0,
    ];
    let filled = signals.iter().filter(|present| **present).count();
    filled as f64 / signals.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <meta name="description" content="Fresh flowers daily">
  <meta name="keywords" content="flowers, bouquets, delivery">
  <title>Bloom &amp; Stem</title>
</head>
<body>
  <header><nav aria-label="Main"><a href="/">Home</a></nav></header>
  <main>
    <h1>Bloom &amp; Stem</h1>
    <section><h2>Bouquets</h2><img src="a.jpg" alt="bouquet"></section>
    <section><h2>Delivery</h2><label>Postcode <input></label></section>
  </main>
  <footer>hello</footer>
</body>
</html>"#;

    const STYLES: &str = r#"
body { color: #333; background: #FAFAFA; font-family: "Inter", Georgia, serif; }
nav { display: flex; }
main { display: grid; border-color: rgb(10, 20, 30); }
h1 { color: rgba(0,0,0,0.8); font-family: Inter, serif; }
@media (max-width: 600px) { nav { display: block; } }
"#;

    fn perf() -> PerformanceMetrics {
        PerformanceMetrics {
            load_time_ms: 120,
            content_size_bytes: PAGE.len() as u64,
        }
    }

    #[test]
    fn colors_are_deduped_lowercased_and_ordered() {
        let colors = extract_colors(STYLES);
        assert_eq!(colors[0], "#333");
        assert_eq!(colors[1], "#fafafa");
        assert!(colors.contains(&"rgb(10,20,30)".to_string()));
        assert!(colors.contains(&"rgba(0,0,0,0.8)".to_string()));
        assert_eq!(colors.len(), 4);
    }

    #[test]
    fn color_palette_is_capped() {
        let css: String = (0..20).map(|i| format!(".c{} {{ color: #1010{:02x}; }}", i, i)).collect();
        assert_eq!(extract_colors(&css).len(), 10);
    }

    #[test]
    fn fonts_strip_quotes_and_dedupe() {
        let fonts = extract_fonts(STYLES);
        assert_eq!(fonts, vec!["Inter", "Georgia", "serif"]);
    }

    #[test]
    fn layout_signals_from_markup_and_css() {
        let analysis = analyze(PAGE, STYLES, &perf());
        assert!(analysis.layout.has_header);
        assert!(analysis.layout.has_nav);
        assert!(analysis.layout.has_footer);
        assert!(analysis.layout.uses_grid);
        assert!(analysis.layout.uses_flexbox);
        assert_eq!(analysis.layout.section_count, 2);
    }

    #[test]
    fn semantic_fields_and_heading_histogram() {
        let analysis = analyze(PAGE, STYLES, &perf());
        assert_eq!(analysis.semantic.title.as_deref(), Some("Bloom & Stem"));
        assert_eq!(
            analysis.semantic.description.as_deref(),
            Some("Fresh flowers daily")
        );
        assert_eq!(
            analysis.semantic.keywords,
            vec!["flowers", "bouquets", "delivery"]
        );
        assert_eq!(analysis.semantic.heading_counts, [1, 2, 0, 0, 0, 0]);
    }

    #[test]
    fn rich_page_scores_full_marks() {
        let analysis = analyze(PAGE, STYLES, &perf());
        assert_eq!(analysis.accessibility_score, 100);
        assert_eq!(analysis.design_score, 100);
        assert!(analysis.mobile_responsive);
        assert!((analysis.confidence_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_input_yields_defaults_not_errors() {
        let analysis = analyze("", "", &PerformanceMetrics::default());
        assert!(analysis.color_palette.is_empty());
        assert!(analysis.font_families.is_empty());
        assert_eq!(analysis.accessibility_score, 50);
        assert_eq!(analysis.design_score, 40);
        assert!(!analysis.mobile_responsive);
        assert_eq!(analysis.confidence_score, 0.0);
    }

    #[test]
    fn class_conventions_and_inline_styles_count_as_layout_signals() {
        let html = r#"<html><body>
            <div class="site-header">logo</div>
            <div class="navbar" style="display: flex">links</div>
            <div style="display:grid">cards</div>
            <div class="page-footer">fine print</div>
        </body></html>"#;
        let analysis = analyze(html, "", &perf());
        assert!(analysis.layout.has_header);
        assert!(analysis.layout.has_nav);
        assert!(analysis.layout.has_footer);
        assert!(analysis.layout.uses_grid);
        assert!(analysis.layout.uses_flexbox);
    }

    #[test]
    fn media_query_alone_marks_responsive() {
        let analysis = analyze("<html></html>", "@media print { body {} }", &perf());
        assert!(analysis.mobile_responsive);
    }
}
