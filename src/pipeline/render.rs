use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use resvg::{tiny_skia, usvg};
use tracing::info;

use crate::store::dao::CountryDao;
use crate::store::models::CountryRecord;

const SUMMARY_WIDTH: u32 = 800;
const SUMMARY_HEIGHT: u32 = 600;
const SUMMARY_FILE_NAME: &str = "summary.png";
const TOP_COUNTRY_LIMIT: i64 = 5;

/// 集計サマリを 800×600 の PNG として単一のキャッシュスロットへ書き出す。
///
/// スロットはリフレッシュ成功のたびに無条件で上書きされる。
pub struct SummaryRenderer {
    cache_dir: PathBuf,
}

impl SummaryRenderer {
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    #[must_use]
    pub fn image_path(&self) -> PathBuf {
        self.cache_dir.join(SUMMARY_FILE_NAME)
    }

    /// 現在の集計状態を問い合わせてラスタライズし、キャッシュへ書き込む。
    ///
    /// # Errors
    /// 集計クエリ、ラスタライズ、キャッシュ書き込みのいずれかが失敗した
    /// 場合はエラーを返す。
    pub async fn render(&self, dao: &dyn CountryDao) -> Result<()> {
        let top_countries = dao.top_countries_by_gdp(TOP_COUNTRY_LIMIT).await?;
        let total_countries = dao.count_countries().await?;
        let last_refreshed_at = dao.last_refreshed_at().await?;

        let svg = build_summary_svg(total_countries, last_refreshed_at, &top_countries);
        let png = rasterize(&svg)?;

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("failed to create cache dir {}", self.cache_dir.display()))?;
        let path = self.image_path();
        tokio::fs::write(&path, &png)
            .await
            .with_context(|| format!("failed to write summary image {}", path.display()))?;

        info!(
            path = %path.display(),
            bytes = png.len(),
            total_countries,
            "summary image regenerated"
        );
        Ok(())
    }
}

fn build_summary_svg(
    total_countries: i64,
    last_refreshed_at: Option<DateTime<Utc>>,
    top_countries: &[CountryRecord],
) -> String {
    let refreshed = last_refreshed_at.map_or_else(
        || "never".to_string(),
        |ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    let mut svg = format!(
        concat!(
            r#"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">"#,
            r##"<rect width="{w}" height="{h}" fill="#ffffff"/>"##,
            r##"<text x="50" y="80" fill="#333333" font-size="40" font-weight="bold" font-family="sans-serif">Country Exchange Rate Summary</text>"##,
            r##"<text x="50" y="140" fill="#555555" font-size="20" font-family="sans-serif">Total Countries: {total}</text>"##,
            r##"<text x="50" y="180" fill="#555555" font-size="20" font-family="sans-serif">Last Refreshed: {refreshed}</text>"##,
            r##"<text x="50" y="240" fill="#555555" font-size="20" font-family="sans-serif">Top 5 Countries by Estimated GDP:</text>"##,
        ),
        w = SUMMARY_WIDTH,
        h = SUMMARY_HEIGHT,
        total = total_countries,
        refreshed = xml_escape(&refreshed),
    );

    for (index, country) in top_countries.iter().enumerate() {
        let gdp = country
            .estimated_gdp
            .map_or_else(|| "n/a".to_string(), format_grouped);
        let y = 280 + index * 30;
        svg.push_str(&format!(
            r##"<text x="70" y="{y}" fill="#777777" font-size="18" font-family="sans-serif">{rank}. {name} - {gdp}</text>"##,
            rank = index + 1,
            name = xml_escape(&country.name),
        ));
    }

    svg.push_str("</svg>");
    svg
}

fn rasterize(svg: &str) -> Result<Vec<u8>> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = usvg::Tree::from_str(svg, &options).context("failed to parse summary markup")?;

    let mut pixmap = tiny_skia::Pixmap::new(SUMMARY_WIDTH, SUMMARY_HEIGHT)
        .context("failed to allocate summary pixmap")?;
    pixmap.fill(tiny_skia::Color::WHITE);
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .context("failed to encode summary image as PNG")
}

/// Thousands grouping on the integer part, fraction dropped.
fn format_grouped(value: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let whole = value.abs().round() as u128;
    let digits = whole.to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, digit) in digits.chars().enumerate() {
        if position > 0 && (digits.len() - position) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    if value < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::dao::{CountryDao, MemoryCountryDao};

    fn record(name: &str, gdp: Option<f64>) -> CountryRecord {
        CountryRecord {
            name: name.to_string(),
            capital: None,
            region: None,
            population: 1,
            currency_code: gdp.map(|_| "XTS".to_string()),
            exchange_rate: gdp.map(|_| 1.0),
            estimated_gdp: gdp,
            flag_url: None,
            last_refreshed_at: None,
        }
    }

    #[test]
    fn format_grouped_inserts_thousands_separators() {
        assert_eq!(format_grouped(0.0), "0");
        assert_eq!(format_grouped(999.0), "999");
        assert_eq!(format_grouped(1000.0), "1,000");
        assert_eq!(format_grouped(206_139_589.4), "206,139,589");
        assert_eq!(format_grouped(1_234_567.89), "1,234,568");
    }

    #[test]
    fn xml_escape_neutralizes_markup() {
        assert_eq!(
            xml_escape(r#"Trinidad & Tobago <"SVG">"#),
            "Trinidad &amp; Tobago &lt;&quot;SVG&quot;&gt;"
        );
    }

    #[test]
    fn summary_markup_lists_ranked_countries() {
        let top = vec![record("Big", Some(2_000_000.0)), record("NoRate", None)];
        let svg = build_summary_svg(7, None, &top);

        assert!(svg.contains("Total Countries: 7"));
        assert!(svg.contains("Last Refreshed: never"));
        assert!(svg.contains("1. Big - 2,000,000"));
        assert!(svg.contains("2. NoRate - n/a"));
        assert!(svg.starts_with(r#"<svg width="800" height="600""#));
    }

    #[test]
    fn rasterize_produces_png_bytes() {
        let svg = build_summary_svg(0, None, &[]);
        let png = rasterize(&svg).expect("rasterize succeeds");

        assert!(!png.is_empty());
        assert!(png.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[tokio::test]
    async fn render_overwrites_single_cache_slot() {
        let dao = MemoryCountryDao::new();
        dao.upsert_country(&record("Ghana", Some(42_000.0)))
            .await
            .expect("seed record");

        let dir = tempfile::tempdir().expect("tempdir");
        let renderer = SummaryRenderer::new(dir.path().join("cache"));

        renderer.render(&dao).await.expect("first render");
        let first = std::fs::metadata(renderer.image_path()).expect("image written");

        renderer.render(&dao).await.expect("second render");
        let second = std::fs::metadata(renderer.image_path()).expect("image rewritten");

        assert!(first.len() > 0);
        assert!(second.len() > 0);
    }
}
