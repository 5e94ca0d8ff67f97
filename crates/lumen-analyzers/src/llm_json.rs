//! Tolerant JSON extraction from LLM responses.
//!
//! Models wrap JSON in prose or markdown fences often enough that strict
//! parsing of the whole response is a reliability bug. These helpers find
//! the outermost object/array and parse just that; any failure is `None`,
//! which every analyzer treats as "no result".

use serde::de::DeserializeOwned;

/// Parse the first `{...}` spanning object in the response.
pub fn extract_object<T: DeserializeOwned>(response: &str) -> Option<T> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}

/// Parse the first `[...]` spanning array in the response.
pub fn extract_array<T: DeserializeOwned>(response: &str) -> Option<Vec<T>> {
    let start = response.find('[')?;
    let end = response.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&response[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Verdict {
        ok: bool,
    }

    #[test]
    fn extracts_object_from_prose() {
        let response = "Sure! Here is the result:\n{\"ok\": true}\nHope that helps.";
        let v: Verdict = extract_object(response).unwrap();
        assert!(v.ok);
    }

    #[test]
    fn extracts_array_from_code_fence() {
        let response = "```json\n[{\"ok\": false}]\n```";
        let v: Vec<Verdict> = extract_array(response).unwrap();
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn non_json_yields_none() {
        assert!(extract_object::<Verdict>("I cannot answer that.").is_none());
        assert!(extract_array::<Verdict>("no array here").is_none());
    }

    #[test]
    fn malformed_json_yields_none() {
        assert!(extract_object::<Verdict>("{\"ok\": ").is_none());
    }
}
