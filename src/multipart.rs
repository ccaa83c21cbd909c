//! `multipart/form-data` bodies for the object-storage and spreadsheet uploads.

use std::sync::atomic::{AtomicU64, Ordering};

static BOUNDARY_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        data: Vec<u8>,
    },
}

/// Ordered list of form parts plus the boundary that separates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        let nanos = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let counter = BOUNDARY_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self::with_boundary(format!("----ebird-sync-{nanos:x}{counter:04x}"))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Text value of the first part called `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            Part::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for part in &self.parts {
            body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match part {
                Part::Text { name, value } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                            escape_quotes(name)
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            escape_quotes(name),
                            escape_quotes(file_name),
                            content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        body
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_text_and_file_parts() {
        let form = MultipartForm::with_boundary("XyZ")
            .text("activity_id", "42")
            .file("file", "sync_S1.xlsx", "application/octet-stream", b"DATA".to_vec());

        let body = String::from_utf8(form.encode()).unwrap();
        assert_eq!(
            body,
            "--XyZ\r\nContent-Disposition: form-data; name=\"activity_id\"\r\n\r\n42\r\n\
             --XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"sync_S1.xlsx\"\r\nContent-Type: application/octet-stream\r\n\r\nDATA\r\n\
             --XyZ--\r\n"
        );
        assert_eq!(form.content_type(), "multipart/form-data; boundary=XyZ");
        assert_eq!(form.text_value("activity_id"), Some("42"));
    }

    #[test]
    fn test_generated_boundaries_differ() {
        assert_ne!(MultipartForm::new().boundary(), MultipartForm::new().boundary());
    }
}
