use serde::Serialize;

/// One directory listing, as written to the output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub link: String,
    #[serde(rename = "type")]
    pub category: String,
    pub name: String,
    pub zip_code: String,
    pub city: String,
    pub street: String,
    pub phone: String,
    pub skills_name: String,
}

impl Record {
    /// Column order of the output file; matches the field order above.
    pub const FIELDS: [&'static str; 8] = [
        "link",
        "type",
        "name",
        "zip_code",
        "city",
        "street",
        "phone",
        "skills_name",
    ];
}
