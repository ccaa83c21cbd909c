//! Merge the Avibase regional checklist into the species reference table.

use crate::parsing::ChecklistParser;
use crate::request::RequestSpec;
use crate::types::{AvibaseSpecies, SpeciesRecord};
use crate::web_session::WebSession;
use crate::Result;
use scraper::Html;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const DEFAULT_AVIBASE_URL: &str =
    "https://avibase.bsc-eoc.org/checklist.jsp?lang=ZH&region=my&list=clements&ref=l_asi_my";

const MERGED_HEADER: [&str; 9] = [
    "序号",
    "中文名",
    "备选中文名",
    "拉丁名",
    "英文名",
    "目",
    "科",
    "ebird",
    "birdreport",
];

/// Download and parse an Avibase checklist page.
pub async fn fetch_avibase(session: &dyn WebSession, url: &str) -> Result<Vec<AvibaseSpecies>> {
    log::info!("Fetching Avibase checklist from {url}");
    let page = session.send(RequestSpec::get(url)).await?.error_for_status()?;
    ChecklistParser::new().parse_avibase_checklist(&Html::parse_document(&page.text()))
}

fn fill_blank(target: &mut String, value: &str) {
    if target.is_empty() {
        *target = value.to_string();
    }
}

/// Outer-join `base` and `scraped` on the Latin name.
///
/// * the base Chinese name is kept; a different scraped name becomes the
///   alternate name, and a blank base name takes the scraped one
/// * blank English name, order and family are filled from the scraped row
/// * scraped species missing from `base` are appended
///
/// The result is deduplicated by Latin name (first row wins) and stably
/// sorted by order then family, blanks last.
pub fn merge_reference_tables(
    base: &[SpeciesRecord],
    scraped: &[AvibaseSpecies],
) -> Vec<SpeciesRecord> {
    let mut scraped_by_latin: HashMap<&str, &AvibaseSpecies> = HashMap::new();
    for species in scraped {
        scraped_by_latin.entry(species.latin.trim()).or_insert(species);
    }

    let mut merged: Vec<SpeciesRecord> = Vec::with_capacity(base.len() + scraped.len());
    for record in base {
        let mut record = record.clone();
        if let Some(new) = scraped_by_latin.get(record.latin.trim()) {
            let new_chinese = new.chinese.trim();
            let old_chinese = record.chinese.trim().to_string();
            if old_chinese.is_empty() {
                record.chinese = new_chinese.to_string();
                record.alternate_chinese.clear();
            } else if !new_chinese.is_empty() && new_chinese != old_chinese {
                record.alternate_chinese = new_chinese.to_string();
            } else {
                record.alternate_chinese.clear();
            }
            fill_blank(&mut record.english, &new.english);
            fill_blank(&mut record.order, &new.order);
            fill_blank(&mut record.family, &new.family);
        }
        merged.push(record);
    }

    let base_latin: HashSet<&str> = base.iter().map(|r| r.latin.trim()).collect();
    merged.extend(
        scraped
            .iter()
            .filter(|s| !base_latin.contains(s.latin.trim()))
            .map(|s| SpeciesRecord {
                chinese: s.chinese.clone(),
                latin: s.latin.clone(),
                english: s.english.clone(),
                order: s.order.clone(),
                family: s.family.clone(),
                ..Default::default()
            }),
    );

    let mut seen = HashSet::new();
    merged.retain(|r| seen.insert(r.latin.trim().to_string()));

    merged.sort_by(|a, b| {
        (a.order.is_empty(), &a.order, a.family.is_empty(), &a.family).cmp(&(
            b.order.is_empty(),
            &b.order,
            b.family.is_empty(),
            &b.family,
        ))
    });

    log::info!(
        "Merged reference table has {} species ({} with an alternate Chinese name)",
        merged.len(),
        merged
            .iter()
            .filter(|r| !r.alternate_chinese.is_empty())
            .count()
    );
    merged
}

/// Write the merged table as UTF-8 CSV with a BOM, numbered from 1.
pub fn write_merged_csv(path: impl AsRef<Path>, records: &[SpeciesRecord]) -> Result<()> {
    let mut file = File::create(path.as_ref())?;
    file.write_all("\u{feff}".as_bytes())?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(MERGED_HEADER)?;
    for (index, r) in records.iter().enumerate() {
        let number = (index + 1).to_string();
        writer.write_record([
            number.as_str(),
            r.chinese.as_str(),
            r.alternate_chinese.as_str(),
            r.latin.as_str(),
            r.english.as_str(),
            r.order.as_str(),
            r.family.as_str(),
            r.ebird.as_str(),
            r.birdreport.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
