//! Label Studio labeling config for the regions the converter emits.

use std::collections::HashSet;

use crate::convert::{IMAGE_NAME, POLYGON_NAME, RECTANGLE_NAME, SCORE_NAME};
use crate::types::{Category, Dataset};

/// Label colours, cycled by category position.
pub const LABEL_COLORS: [&str; 10] = [
    "green", "blue", "red", "orange", "purple", "cyan", "magenta", "yellow", "brown", "pink",
];

/// Build the labeling XML: one image, polygon and rectangle tools sharing the
/// category labels, and a read-only per-region score.
pub fn label_config(categories: &[Category]) -> String {
    let labels: String = categories
        .iter()
        .enumerate()
        .map(|(i, cat)| {
            let color = LABEL_COLORS[i % LABEL_COLORS.len()];
            format!(
                "    <Label value=\"{}\" background=\"{color}\"/>\n",
                escape(&cat.name)
            )
        })
        .collect();

    format!(
        r#"<View>
  <Image name="{IMAGE_NAME}" value="$image" zoom="true"/>
  <PolygonLabels name="{POLYGON_NAME}" toName="{IMAGE_NAME}" strokeWidth="2" pointSize="small" opacity="0.5">
{labels}  </PolygonLabels>
  <RectangleLabels name="{RECTANGLE_NAME}" toName="{IMAGE_NAME}" strokeWidth="2" opacity="0.5">
{labels}  </RectangleLabels>
  <Number name="{SCORE_NAME}" toName="{IMAGE_NAME}" perRegion="true" editable="false"/>
</View>
"#
    )
}

/// Categories referenced by at least one annotation, in document order.
pub fn active_categories(dataset: &Dataset) -> Vec<Category> {
    let used: HashSet<u64> = dataset.annotations.iter().map(|a| a.category_id).collect();
    dataset
        .categories
        .iter()
        .filter(|c| used.contains(&c.id))
        .cloned()
        .collect()
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
