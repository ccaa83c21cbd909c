//! HTML parsing for eBird, CAS and Avibase pages.
//!
//! All functions here are pure: they take a parsed document and return typed
//! records. Selectors follow the markup the sites rendered at the time of
//! writing (CSS class names and Vue component attributes), so a failing parse
//! usually means the upstream page changed.

use crate::types::{AvibaseSpecies, ChecklistDetail, ChecklistSummary, Observation};
use crate::{Result, SyncError};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

const UNKNOWN_LOCATION: &str = "未知地点";

fn selector(css: &'static str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| SyncError::Parse(format!("Invalid selector {css}: {e}")))
}

/// Concatenated text of an element with every text node trimmed.
pub fn stripped_text(element: ElementRef) -> String {
    element.text().map(str::trim).collect::<String>()
}

fn first_text(element: ElementRef, sel: &Selector) -> Option<String> {
    element.select(sel).next().map(stripped_text)
}

/// Stateless parser for the pages this crate scrapes.
#[derive(Debug, Clone, Default)]
pub struct ChecklistParser;

impl ChecklistParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the "My checklists" listing.
    ///
    /// Rows without a `checklist-<ID>` id are skipped; so are rows that fail to
    /// parse, with a warning.
    pub fn parse_checklist_history(&self, document: &Html) -> Result<Vec<ChecklistSummary>> {
        let row_selector = selector("li.ResultsStats--manageMyChecklists")?;
        let mut checklists = Vec::new();

        for row in document.select(&row_selector) {
            match self.parse_history_row(row) {
                Ok(Some(checklist)) => checklists.push(checklist),
                Ok(None) => {}
                Err(e) => log::warn!("Skipping checklist row: {e}"),
            }
        }

        log::debug!("Parsed {} checklists from history page", checklists.len());
        Ok(checklists)
    }

    fn parse_history_row(&self, row: ElementRef) -> Result<Option<ChecklistSummary>> {
        let Some(id) = row
            .value()
            .attr("id")
            .and_then(|id| id.strip_prefix("checklist-"))
            .filter(|id| !id.is_empty())
        else {
            return Ok(None);
        };

        let date = first_text(row, &selector(".Heading-main")?).unwrap_or_default();
        let time = first_text(row, &selector(".Heading-sub")?).unwrap_or_default();
        let location = first_text(row, &selector(".ResultsStats-details-location")?)
            .unwrap_or_else(|| UNKNOWN_LOCATION.to_string());
        let county = first_text(row, &selector(".ResultsStats-details-county")?).unwrap_or_default();

        let country_selector = selector(".ResultsStats-details-stateCountry")?;
        let countries: Vec<String> = row.select(&country_selector).map(stripped_text).collect();
        let state = countries.first().cloned().unwrap_or_default();

        Ok(Some(ChecklistSummary {
            id: id.to_string(),
            date_time: format!("{date} {time}"),
            location,
            countries,
            state,
            county,
        }))
    }

    /// Parse a checklist detail page into observation ids and the media CSRF token.
    pub fn parse_checklist_detail(&self, document: &Html) -> Result<ChecklistDetail> {
        let csrf_token = document
            .select(&selector("checklist-featured-media")?)
            .next()
            .and_then(|component| component.value().attr("rating-csrf"))
            .filter(|token| !token.is_empty())
            .map(|token| token.to_string());

        let mut rows: Vec<ElementRef> = document.select(&selector("li[data-observation]")?).collect();
        if rows.is_empty() {
            rows = document.select(&selector("section.Observation")?).collect();
        }

        let link_selector = selector("a[data-species-code]")?;
        let name_selector = selector("span.Heading-main")?;
        let button_selector = selector("button[data-obsid]")?;

        let mut observations = Vec::new();
        for row in rows {
            let Some(link) = row.select(&link_selector).next() else {
                continue;
            };
            let species_code = link.value().attr("data-species-code").unwrap_or_default();
            let name = first_text(link, &name_selector).unwrap_or_default();
            let obs_id = row
                .select(&button_selector)
                .next()
                .and_then(|button| button.value().attr("data-obsid"))
                .unwrap_or_default();

            if name.is_empty() || obs_id.is_empty() {
                log::debug!("Observation row without name or obsId skipped");
                continue;
            }

            observations.push(Observation {
                name,
                obs_id: obs_id.to_string(),
                species_code: species_code.to_string(),
            });
        }

        log::debug!(
            "Parsed {} observations (csrf token present: {})",
            observations.len(),
            csrf_token.is_some()
        );
        Ok(ChecklistDetail {
            csrf_token,
            observations,
        })
    }

    /// Extract the one-time `execution` token from the CAS login form.
    pub fn parse_execution_token(&self, document: &Html) -> Result<String> {
        document
            .select(&selector("input[name=\"execution\"]")?)
            .next()
            .and_then(|input| input.value().attr("value"))
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
            .ok_or(SyncError::TokenNotFound)
    }

    /// Error messages rendered on a failed CAS login.
    pub fn parse_login_error(&self, document: &Html) -> String {
        let messages: Vec<String> = selector("#msg, .errors, .alert-danger, .form-error")
            .map(|sel| {
                document
                    .select(&sel)
                    .map(stripped_text)
                    .filter(|text| !text.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if messages.is_empty() {
            "Login failed - please check your credentials".to_string()
        } else {
            format!("Login failed: {}", messages.join("; "))
        }
    }

    /// Parse an Avibase regional checklist table.
    ///
    /// Order/family header rows look like `PASSERIFORMES: Pycnonotidae` and
    /// apply to the species rows below them.
    pub fn parse_avibase_checklist(&self, document: &Html) -> Result<Vec<AvibaseSpecies>> {
        let row_selector = selector("tr")?;
        let cell_selector = selector("td")?;
        let italic_selector = selector("i")?;
        let note_pattern = Regex::new(r"[\(（].*?[\)）]")
            .map_err(|e| SyncError::Parse(e.to_string()))?;

        let mut species = Vec::new();
        let (mut order, mut family) = (String::new(), String::new());

        for row in document.select(&row_selector) {
            let header_text = stripped_text(row);
            let upper = header_text.to_uppercase();
            if header_text.contains(':') && (upper.contains("IDAE") || upper.contains("IFORMES")) {
                let mut parts = header_text.split(':');
                order = parts.next().unwrap_or_default().trim().to_string();
                family = parts.next().unwrap_or_default().trim().to_string();
                continue;
            }

            let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
            if cells.len() < 3 {
                continue;
            }

            let english = stripped_text(cells[0]);
            let latin = first_text(cells[1], &italic_selector).unwrap_or_else(|| stripped_text(cells[1]));
            let chinese = note_pattern
                .replace_all(&stripped_text(cells[2]), "")
                .trim()
                .to_string();

            if !chinese.is_empty() && !english.is_empty() {
                species.push(AvibaseSpecies {
                    chinese,
                    latin,
                    english,
                    order: order.clone(),
                    family: family.clone(),
                });
            }
        }

        log::debug!("Parsed {} species from Avibase", species.len());
        Ok(species)
    }
}
