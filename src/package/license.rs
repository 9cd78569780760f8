use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LicenseDescription {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_note: Option<String>,
}

impl LicenseDescription {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            update_note: None,
        }
    }

    fn with_note(mut self, note: String) -> Self {
        self.update_note = Some(note);
        self
    }
}

fn without<'a>(from: &'a [String], excluded: &[String]) -> Vec<&'a str> {
    from.iter()
        .filter(|license| !excluded.contains(license))
        .map(String::as_str)
        .collect()
}

/// Describe the current license and what changes on upgrading.
///
/// `recommended` of `None` means the recommended release carries no license data,
/// in which case nothing is assumed to change.
pub fn describe_change(current: &[String], recommended: Option<&[String]>) -> LicenseDescription {
    let recommended = recommended.unwrap_or(current);
    let now_included = without(recommended, current);
    let now_excluded = without(current, recommended);
    let current_text = current.join(" or ");

    if !now_excluded.is_empty() {
        LicenseDescription::new(current_text).with_note(format!(
            "rec'd ver. doesn't allow {}",
            now_excluded.join(" or ")
        ))
    } else if now_included.is_empty() {
        LicenseDescription::new(current_text)
    } else if current.is_empty() {
        LicenseDescription::new(format!("Rec'd ver.: {}", now_included.join(" or ")))
    } else {
        LicenseDescription::new(current_text).with_note(format!(
            "or {} on upgrade to rec'd ver.",
            now_included.join(" or ")
        ))
    }
}
