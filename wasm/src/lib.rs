use plantuml_live::pipeline::{Endpoint, RemoteFormat};
use plantuml_live::style::{StyleDetection, effective_source, select_style};
use plantuml_live::template::select_template;
use serde::Deserialize;
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UrlOptions {
    server: Option<String>,
    format: Option<RemoteFormat>,
    style_detection: Option<StyleDetection>,
}

impl UrlOptions {
    fn parse(options_json: Option<String>) -> Result<Self, JsValue> {
        match options_json {
            Some(raw) => serde_json::from_str(&raw).map_err(|error| JsValue::from_str(&error.to_string())),
            None => Ok(Self::default()),
        }
    }

    fn endpoint(&self) -> Endpoint {
        let mut endpoint = Endpoint::default();
        if let Some(server) = &self.server {
            endpoint.server = server.trim_end_matches('/').to_string();
        }
        if let Some(format) = self.format {
            endpoint.format = format;
        }
        endpoint
    }
}

/// Source with the catalog style `style` spliced in. Unknown ids and
/// `default` apply no style.
#[wasm_bindgen(js_name = effectiveSource)]
pub fn effective_source_js(source: &str, style: &str, detection: Option<String>) -> Result<String, JsValue> {
    let detection = match detection.as_deref() {
        None | Some("substring") => StyleDetection::Substring,
        Some("lineStart") => StyleDetection::LineStart,
        Some(other) => return Err(JsValue::from_str(&format!("unknown style detection `{other}`"))),
    };
    Ok(effective_source(source, select_style(style), detection).into_owned())
}

#[wasm_bindgen(js_name = encodeSource)]
pub fn encode_source(source: &str) -> Result<String, JsValue> {
    plantuml_live::encode(source).map_err(|error| JsValue::from_str(&error.to_string()))
}

/// Render URL for `source` with `style` applied, or `undefined` for blank
/// source.
#[wasm_bindgen(js_name = diagramUrl)]
pub fn diagram_url(source: &str, style: &str, options_json: Option<String>) -> Result<Option<String>, JsValue> {
    if source.trim().is_empty() {
        return Ok(None);
    }
    let options = UrlOptions::parse(options_json)?;
    let spliced = effective_source(
        source,
        select_style(style),
        options.style_detection.unwrap_or_default(),
    );
    let encoded = encode_source(&spliced)?;
    Ok(Some(options.endpoint().url_for(&encoded)))
}

#[wasm_bindgen(js_name = styleCode)]
pub fn style_code(id: &str) -> String {
    select_style(id).to_string()
}

#[wasm_bindgen(js_name = templateCode)]
pub fn template_code(id: &str) -> Option<String> {
    select_template(id).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_style_and_options() {
        let options = r#"{"server":"http://localhost:8080/","format":"png"}"#;
        let url = diagram_url("@startuml\nA -> B\n@enduml", "blueprint", Some(options.to_string()))
            .unwrap()
            .unwrap();
        assert!(url.starts_with("http://localhost:8080/png/"));

        let encoded = url.rsplit('/').next().unwrap();
        let decoded = plantuml_live::decode(encoded).unwrap();
        assert!(decoded.contains("skinparam backgroundColor #EEEBDC"));
    }

    #[test]
    fn default_and_unknown_styles_leave_source_alone() {
        let source = "@startuml\nAlice -> Bob: Hi\n@enduml";
        assert_eq!(effective_source_js(source, "default", None).unwrap(), source);
        assert_eq!(effective_source_js(source, "blueprintt", None).unwrap(), source);

        let url = diagram_url(source, "default", None).unwrap().unwrap();
        let encoded = url.rsplit('/').next().unwrap();
        assert_eq!(plantuml_live::decode(encoded).unwrap(), source);
    }

    #[test]
    fn known_style_is_spliced_by_id() {
        let source = "@startuml\nAlice -> Bob: Hi\n@enduml";
        let spliced = effective_source_js(source, "minimal", Some("lineStart".to_string())).unwrap();
        assert!(spliced.starts_with(&format!("@startuml\n{}\n", select_style("minimal"))));
    }

    #[test]
    fn blank_source_has_no_url() {
        assert_eq!(diagram_url("  \n", "default", None).unwrap(), None);
    }

    #[test]
    fn known_ids_resolve() {
        assert!(style_code("minimal").starts_with("skinparam"));
        assert_eq!(style_code("unknown"), "");
        assert!(template_code("simple").is_some());
        assert!(template_code("nope").is_none());
    }
}
