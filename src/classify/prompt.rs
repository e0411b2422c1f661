// src/classify/prompt.rs
use chrono::NaiveDate;
use std::fmt::Write as _;

use crate::ingest::types::NormalizedArticle;

const RELATED: &[&str] = &[
    "new aircraft hangar construction",
    "hangar renovation, expansion or demolition",
    "aircraft maintenance, repair and overhaul (MRO) facilities",
    "hangar doors, equipment, systems and infrastructure",
    "hangar operations, leasing and management",
    "airport infrastructure projects that include hangar facilities",
    "maintenance base construction or expansion",
    "flight training facilities or academies with hangar components",
];

const NOT_RELATED: &[&str] = &[
    "general aviation news",
    "aircraft purchases and sales",
    "flight operations and schedules",
    "terminals or runways without any hangar component",
    "airline business news",
    "repairs that merely take place inside a hangar",
    "incidents that only mention a hangar as a location",
];

/// Single-message prompt for one batch. `today` anchors completion-status reasoning.
pub fn build_batch_prompt(
    articles: &[NormalizedArticle],
    today: NaiveDate,
    with_patterns: bool,
) -> String {
    let date = today.format("%B %d, %Y");
    let n = articles.len();
    let mut p = String::with_capacity(2_048 + n * 256);

    let _ = writeln!(p, "Classify aircraft hangar news articles and answer with JSON only.");
    let _ = writeln!(p);
    let _ = writeln!(p, "Today's date is {date}. Judge completion status against this date.");
    let _ = writeln!(p);

    let _ = writeln!(p, "Fields:");
    let _ = writeln!(p, "1. is_hangar_related (boolean). true only for:");
    for item in RELATED {
        let _ = writeln!(p, "   - {item}");
    }
    let _ = writeln!(p, "   false for:");
    for item in NOT_RELATED {
        let _ = writeln!(p, "   - {item}");
    }

    let _ = writeln!(
        p,
        "2. country (string): two-letter ISO code (US, CA, GB, FR, AE, AU, ...), or \"N/A\" \
         when the title and summary do not name one."
    );
    let _ = writeln!(p, "3. region (string): exactly one of \"UK_NA\", \"EMEA\", \"APAC\", \"LATAM\".");
    let _ = writeln!(p, "   - UK_NA: United Kingdom, United States, Canada");
    let _ = writeln!(p, "   - EMEA: rest of Europe, Middle East, Africa");
    let _ = writeln!(p, "   - APAC: Asia-Pacific including Australia and New Zealand");
    let _ = writeln!(p, "   - LATAM: Mexico, Central America, South America, Caribbean");
    let _ = writeln!(p, "4. completion_status (boolean), relative to {date}:");
    let _ = writeln!(
        p,
        "   - true if the project has opened or finished, or its stated deadline or \
         scheduled date is already in the past"
    );
    let _ = writeln!(
        p,
        "   - false if it is planned for a future date, under construction without a \
         completion date, or still in planning"
    );
    if with_patterns {
        let _ = writeln!(
            p,
            "5. patterns (array of strings): two to four short lower-case tags naming the \
             specific project (operator, airport, site), identical across articles about \
             the same project."
        );
    }

    let _ = writeln!(p);
    let _ = writeln!(p, "Articles:");
    for (i, a) in articles.iter().enumerate() {
        let _ = writeln!(p, "{}. Title: {}", i + 1, a.project_title);
        let _ = writeln!(p, "   Summary: {}", a.summary);
    }

    let _ = writeln!(p);
    let keys = if with_patterns {
        "article_id, is_hangar_related, country, region, completion_status, patterns"
    } else {
        "article_id, is_hangar_related, country, region, completion_status"
    };
    let _ = writeln!(
        p,
        "Return {{\"results\": [...]}} with exactly {n} objects, article_id 1 to {n} in \
         article order. Each object has: {keys}."
    );
    p
}
