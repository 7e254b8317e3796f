//! Manual retrieval worklist.
//!
//! A markdown file a human can work through: every record the pipeline
//! could not retrieve automatically, ordered by how much it matters,
//! with a download link and the filename the resolver will recognize.

use std::fs;
use std::path::Path;

use chrono::Utc;

use crate::error::StoreError;
use crate::model::Record;

/// Write the worklist for `records` to `path`. Returns how many
/// records were listed.
///
/// Order: seed-tagged records first, then by seed connections, then by
/// citation count, both descending.
pub fn write_manual_list(records: &[&Record], path: &Path) -> Result<usize, StoreError> {
    if records.is_empty() {
        fs::write(
            path,
            "# Records Needing Manual Retrieval\n\nNothing currently needs manual retrieval.\n",
        )?;
        return Ok(0);
    }

    let mut sorted: Vec<&Record> = records.to_vec();
    sorted.sort_by_key(|r| {
        (
            !r.has_tag("seed"),
            std::cmp::Reverse(r.seed_connections.unwrap_or(0)),
            std::cmp::Reverse(r.citation_count.unwrap_or(0)),
        )
    });

    let mut lines = vec![
        "# Records Needing Manual Retrieval".to_string(),
        String::new(),
        format!("Generated: {}", Utc::now().format("%Y-%m-%dT%H:%M:%SZ")),
        format!("Total: {} records", sorted.len()),
        String::new(),
        "## How to add full text".to_string(),
        String::new(),
        "1. Download the PDF from the link below (institutional access, interlibrary loan, etc.)"
            .to_string(),
        "2. Name the file as suggested, or use any name and let the resolver match by content"
            .to_string(),
        "3. Drop it into the inbox directory".to_string(),
        "4. Run: `litkeep ingest`".to_string(),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for (i, record) in sorted.iter().enumerate() {
        let year = record
            .year
            .map_or_else(|| "n.d.".to_string(), |y| y.to_string());
        lines.push(format!("### {}. {} ({year})", i + 1, record.title));

        let mut authors: Vec<&str> = record.authors.iter().take(3).map(|a| a.name.as_str()).collect();
        if record.authors.len() > 3 {
            authors.push("et al.");
        }
        if !authors.is_empty() {
            lines.push(format!("- **Authors:** {}", authors.join(", ")));
        }
        if let Some(venue) = &record.venue {
            lines.push(format!("- **Venue:** {venue}"));
        }
        if let Some(doi) = &record.doi {
            lines.push(format!("- **DOI:** {doi}"));
            lines.push(format!("- **Publisher link:** https://doi.org/{doi}"));
        }
        if let Some(n) = record.citation_count {
            lines.push(format!("- **Citations:** {n}"));
        }
        if let Some(n) = record.seed_connections {
            lines.push(format!("- **Seed connections:** {n}"));
        }
        if let Some(query) = &record.discovery_query {
            lines.push(format!(
                "- **Discovered via:** {} ({query})",
                record.discovery_method
            ));
        } else {
            lines.push(format!("- **Discovered via:** {}", record.discovery_method));
        }
        lines.push(format!(
            "- **Suggested filename:** `{}`",
            record.suggested_filename()
        ));
        lines.push(String::new());
    }

    fs::write(path, lines.join("\n"))?;
    Ok(sorted.len())
}
