//! C3 Prompt Builder: renders the recommendation prompt from the CAM,
//! the pipe-delimited candidate table, and the optional enhancer blocks.
//! Deterministic: no randomness, no wall-clock dependency.

use crate::types::{CandidateRow, ClampedParams};

const CANDIDATE_FIELDS: &[&str] = &[
    "GRADE",
    "BRAND",
    "Model",
    "WET_GRIP",
    "FUEL",
    "NOISE_REDUCTION",
    "SEASONAL_PERFORMANCE",
    "OE",
    "AWARD_SCORE",
    "RunflatStatus",
    "Segment",
    "PRICE_pct",
    "GRADE_pct",
    "FUEL_pct",
    "WET_GRIP_pct",
    "AWARD_SCORE_pct",
    "Vehicle",
    "SIZE",
    "PRICE",
    "OFFER",
    "PRICEFLUCTUATION",
    "Orders",
    "Units",
    "GoldilocksZone",
    "PremiumShare",
    "MidRangeShare",
    "BudgetShare",
    "RunflatShare",
    "SalesStatus",
    "PRODUCTLISTVIEWS",
    "CLICKSTREAMRATE",
];

const HEADER_ROW: &str = "TyreScore|ProdID|WetGrade|Brand|Model|WetVal|FuelVal|NoiseVal|Season|IsOE|AwardScore|IsRunflat|Segment|PriceScore|WetScore|FuelScore|WetScorePct|AwardScorePct|Vehicle|Size|PriceGBP|IsOffer|PriceFluct|Orders|Units|Goldilocks|PremShare|MidShare|BudShare|RFShare|Status|Views|ClickRate";

/// Renders the candidate rows as a pipe-delimited table: a header row plus
/// one row per candidate, in warehouse order (candidate priority). Any `|`
/// inside a field is replaced with `/` so it can't be mistaken for a column
/// separator.
pub(crate) fn render_candidate_table(rows: &[CandidateRow]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(HEADER_ROW.to_string());
    for row in rows {
        let mut cells = vec![row.tyre_score.to_string(), row.product_id.clone()];
        for field in CANDIDATE_FIELDS {
            cells.push(row.field(field));
        }
        let clean: Vec<String> = cells.iter().map(|c| c.replace('|', "/")).collect();
        lines.push(clean.join("|"));
    }
    lines.join("\n")
}

fn brand_enhancer_block(brand_enhancer: Option<&str>, vehicle: &str, size: &str) -> String {
    let brand = match brand_enhancer {
        Some(b) if !b.trim().is_empty() => b.trim().to_lowercase(),
        _ => return String::new(),
    };
    format!(
        "- Because the brand {brand} is currently on offer, customers are significantly more likely \
to purchase these products, even if they fall outside the Goldilocks Zone or price fluctuation ranges.\n\
- You must always include at least one tyre from the brand {brand} in the final Tyre Suggestions section, even if it has never sold to a {vehicle}.\n\
- Select the {brand} model that is most similar to the most popular product for {vehicle} in {size} - you are permitted to override all other rules to ensure its inclusion.\n\
- This is a hard rule: if no {brand} tyre appears in the recommendations, your output is invalid."
    )
}

fn model_enhancer_block(model_enhancer: Option<&str>) -> String {
    let model = match model_enhancer {
        Some(m) if !m.trim().is_empty() => m.trim().to_lowercase(),
        _ => return String::new(),
    };
    format!(
        "- Because the model {model} is currently being promoted, it must be included in the final Tyre Suggestions.\n\
- You must select an exact match for {model} from the available data. Do NOT use any earlier, later, or similar versions of this model.\n\
- This is a hard rule: if no {model} model appears in the recommendations, your output is invalid.\n\
- IMPORTANT: When you include a tyre with the {model} model, it must always appear as **HB3** in the final output. Place it in the third hotbox position, even if its score is higher than the other tyres."
    )
}

fn season_enhancer_block(season: Option<&str>) -> String {
    let season = match season {
        Some(s) if matches!(s.trim().to_lowercase().as_str(), "summer" | "winter" | "allseason") => {
            s.trim().to_lowercase()
        }
        _ => return String::new(),
    };
    format!(
        "- The customer has explicitly requested tyres designed for **{season}** use.\n\
- You must select at least 1 tyre with Seasonal Performance marked as **{season}** within primary recommendations, subject to Slot Eligibility and the Non-Override Guardrails.\n\
- If a Season enhancer product is chosen and it is Budget, it may only occupy HB4 (and only if BudgetShare permits). Otherwise use the top-scoring non-Budget seasonal tyre.\n\
- IMPORTANT: Place the selected seasonal tyre in HB4 unless that would violate Budget placement/count; if so, place it in the highest eligible HB slot (HB3 if Budget; HB1/HB2 only if non-Budget).\n\
- This is a hard rule: if no eligible **{season}** tyre appears in primary recommendations, your output is invalid."
    )
}

/// Builds the full prompt string for a single CAM. Pure function of its
/// arguments: same inputs always produce the same output.
pub(crate) fn build_prompt(
    vehicle: &str,
    size: &str,
    candidate_rows: &[CandidateRow],
    params: ClampedParams,
    brand_enhancer: Option<&str>,
    model_enhancer: Option<&str>,
    season: Option<&str>,
) -> String {
    let tyre_data_str = render_candidate_table(candidate_rows);
    let brand_block = brand_enhancer_block(brand_enhancer, vehicle, size);
    let model_block = model_enhancer_block(model_enhancer);
    let season_block = season_enhancer_block(season);

    let mut out = String::new();
    out.push_str(&format!(
        "You are a tyre recommendation engine. Recommend tyres for vehicle \"{vehicle}\" in size \"{size}\".\n\n"
    ));
    out.push_str(&format!(
        "Goldilocks zone tolerance: {}%. Price fluctuation band: {:.2}x upper / {:.2}x lower.\n\n",
        params.goldilocks_zone_pct, params.price_fluctuation_upper, params.price_fluctuation_lower
    ));
    out.push_str("Candidate tyres (pipe-delimited, header row first):\n");
    out.push_str(&tyre_data_str);
    out.push_str("\n\n");

    if !brand_block.is_empty() {
        out.push_str("Brand enhancer:\n");
        out.push_str(&brand_block);
        out.push_str("\n\n");
    }
    if !model_block.is_empty() {
        out.push_str("Model enhancer:\n");
        out.push_str(&model_block);
        out.push_str("\n\n");
    }
    if !season_block.is_empty() {
        out.push_str("Season enhancer:\n");
        out.push_str(&season_block);
        out.push_str("\n\n");
    }

    out.push_str(
        "Respond with exactly one line: the vehicle, then the size, then 4 hotbox product IDs, \
then 16 additional SKU product IDs, all space-separated. Use only digit-only product IDs of \
length 7 or 8, or \"-\" for an unfillable slot. Do not include any other text.",
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CandidateRow;
    use std::collections::BTreeMap;

    fn row(product_id: &str, score: f64) -> CandidateRow {
        CandidateRow {
            product_id: product_id.to_string(),
            tyre_score: score,
            units: 10.0,
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn render_candidate_table_has_header_and_one_row_per_candidate() {
        let rows = vec![row("1234567", 1.0), row("12345678", 2.0)];
        let rendered = render_candidate_table(&rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TyreScore|ProdID"));
    }

    #[test]
    fn build_prompt_is_deterministic() {
        let rows = vec![row("1234567", 1.0)];
        let params = crate::types::RecommendationParams::default().clamp();
        let a = build_prompt("Golf", "205/55 R16", &rows, params, None, None, None);
        let b = build_prompt("Golf", "205/55 R16", &rows, params, None, None, None);
        assert_eq!(a, b);
    }

    #[test]
    fn enhancer_blocks_only_appear_when_populated() {
        let rows = vec![row("1234567", 1.0)];
        let params = crate::types::RecommendationParams::default().clamp();
        let without = build_prompt("Golf", "205/55 R16", &rows, params, None, None, None);
        assert!(!without.contains("Brand enhancer"));

        let with_brand =
            build_prompt("Golf", "205/55 R16", &rows, params, Some("Michelin"), None, None);
        assert!(with_brand.contains("Brand enhancer"));
        assert!(with_brand.contains("michelin"));
    }

    #[test]
    fn season_enhancer_rejects_unknown_value() {
        let rows = vec![row("1234567", 1.0)];
        let params = crate::types::RecommendationParams::default().clamp();
        let out = build_prompt("Golf", "205/55 R16", &rows, params, None, None, Some("monsoon"));
        assert!(!out.contains("Season enhancer"));
    }
}
