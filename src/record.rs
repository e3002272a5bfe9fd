use std::collections::BTreeMap;

/// One gallery entry found by the paginator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReference {
    pub shot_id: String,
    /// CSS selector that finds the tile again.
    pub locator: String,
    /// Fields already visible on the grid tile.
    pub summary: BTreeMap<String, String>,
}

/// Metadata scraped for one shot; written verbatim as one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    shot_id: String,
    image_url: String,
    fields: BTreeMap<String, String>,
}

impl MetadataRecord {
    pub fn new(shot_id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            shot_id: shot_id.into(),
            image_url: image_url.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn shot_id(&self) -> &str {
        &self.shot_id
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    /// Set a field; `shot_id` and `image_url` are fixed at construction.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if name == "shot_id" || name == "image_url" {
            return;
        }
        self.fields.insert(name, value.into());
    }

    pub fn extend<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in fields {
            self.insert(name, value);
        }
    }

    /// Value for a spreadsheet column, if the shot has one.
    pub fn get(&self, column: &str) -> Option<&str> {
        match column {
            "shot_id" => Some(&self.shot_id),
            "image_url" => Some(&self.image_url),
            _ => self.fields.get(column).map(String::as_str),
        }
    }

    /// Names of the free-form fields, sorted.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}
