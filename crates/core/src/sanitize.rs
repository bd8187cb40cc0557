//! Declarative HTML cleaning for article bodies.
//!
//! Four denylists drive the pass: element ids, element classes, structural
//! selectors, and attribute/value pairs. Matching elements are detached from
//! the parsed tree; matching attribute pairs are dropped from their element,
//! which is kept. The tree is then written back out with a serializer whose
//! output re-parses to the same tree, so cleaning already-clean HTML is a no-op.

use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};

/// One attribute/value pair to strip, e.g. `style="display:none;"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePair {
	pub name: String,
	pub value: String,
}

impl AttributePair {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SanitizeRules {
	pub remove_ids: Vec<String>,
	pub remove_classes: Vec<String>,
	pub remove_selectors: Vec<String>,
	pub strip_attributes: Vec<AttributePair>,
}

impl Default for SanitizeRules {
	fn default() -> Self {
		let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
		Self {
			remove_ids: owned(&[
				"js_tags_preview_toast",
				"wx_stream_article_slide_tip",
				"js_pc_weapp_code",
				"wx_expand_slidetip",
				"js_alert_panel",
				"js_emotion_panel_pc",
				"js_product_dialog",
				"js_analyze_btn",
				"js_jump_wx_qrcode_dialog",
				"js_extra_content",
				"js_article_bottom_bar",
				"img_list_indicator_wrp",
				"img_list_indicator",
			]),
			remove_classes: owned(&[
				"weui-dialog__btn",
				"wx_expand_bottom",
				"weui-dialog",
				"hidden",
				"weui-a11y_ref",
				"reward_dialog",
				"reward_area_carry_whisper",
				"bottom_bar_interaction_wrp",
			]),
			remove_selectors: owned(&["link", "head", "script"]),
			strip_attributes: vec![
				AttributePair::new("style", "display: none;"),
				AttributePair::new("style", "display:none;"),
				AttributePair::new("aria-hidden", "true"),
			],
		}
	}
}

/// Compiled [`SanitizeRules`].
#[derive(Debug)]
pub struct ContentSanitizer {
	rules: SanitizeRules,
	selectors: Vec<Selector>,
}

impl Default for ContentSanitizer {
	fn default() -> Self {
		match Self::new(SanitizeRules::default()) {
			Ok(sanitizer) => sanitizer,
			Err(err) => unreachable!("built-in sanitize selectors must parse: {err}"),
		}
	}
}

impl ContentSanitizer {
	pub fn new(rules: SanitizeRules) -> Result<Self> {
		let selectors = rules
			.remove_selectors
			.iter()
			.map(|raw| Selector::parse(raw).map_err(|e| HarvestError::Config(format!("invalid sanitize selector {raw:?}: {e}"))))
			.collect::<Result<Vec<_>>>()?;
		Ok(Self { rules, selectors })
	}

	pub fn rules(&self) -> &SanitizeRules {
		&self.rules
	}

	/// Cleans an HTML fragment.
	pub fn sanitize(&self, html: &str) -> String {
		let mut doc = Html::parse_fragment(html);
		let root = doc.root_element().id();

		let mut doomed = Vec::new();
		for node in doc.tree.root().descendants() {
			let Some(el) = ElementRef::wrap(node) else {
				continue;
			};
			if el.id() != root && self.denied(el) {
				doomed.push(el.id());
			}
		}
		for selector in &self.selectors {
			doomed.extend(doc.select(selector).map(|el| el.id()).filter(|id| *id != root));
		}

		for id in doomed {
			if let Some(mut node) = doc.tree.get_mut(id) {
				node.detach();
			}
		}

		let mut out = String::with_capacity(html.len());
		self.write_children(doc.root_element(), &mut out);
		out
	}

	fn denied(&self, el: ElementRef<'_>) -> bool {
		let value = el.value();
		if value.id().is_some_and(|id| self.rules.remove_ids.iter().any(|denied| denied == id)) {
			return true;
		}
		value.classes().any(|class| self.rules.remove_classes.iter().any(|denied| denied == class))
	}

	fn stripped(&self, name: &str, value: &str) -> bool {
		self.rules.strip_attributes.iter().any(|pair| pair.name == name && pair.value == value.trim())
	}

	/// Returns `true` once a `plaintext` element was written; nothing may
	/// follow it, not even closing tags, since it swallows the rest of the input.
	fn write_children(&self, parent: ElementRef<'_>, out: &mut String) -> bool {
		let parent_name = parent.value().name();
		let raw = RAW_TEXT.contains(&parent_name);
		let mut first = true;

		for child in parent.children() {
			match child.value() {
				Node::Text(text) => {
					if first && LEADING_NEWLINE.contains(&parent_name) && text.starts_with('\n') {
						out.push('\n');
					}
					if raw {
						out.push_str(text);
					} else {
						escape_text(text, out);
					}
				}
				Node::Comment(comment) => {
					out.push_str("<!--");
					out.push_str(comment);
					out.push_str("-->");
				}
				Node::Element(_) => {
					if let Some(el) = ElementRef::wrap(child) {
						if self.write_element(el, out) {
							return true;
						}
					}
				}
				_ => {}
			}
			first = false;
		}
		false
	}

	fn write_element(&self, el: ElementRef<'_>, out: &mut String) -> bool {
		let name = el.value().name();
		out.push('<');
		out.push_str(name);
		for (attr, value) in el.value().attrs() {
			if self.stripped(attr, value) {
				continue;
			}
			out.push(' ');
			out.push_str(attr);
			out.push_str("=\"");
			escape_attr(value, out);
			out.push('"');
		}
		out.push('>');

		if VOID.contains(&name) {
			return false;
		}
		if self.write_children(el, out) || name == "plaintext" {
			return true;
		}
		out.push_str("</");
		out.push_str(name);
		out.push('>');
		false
	}

	/// Image URLs inside an HTML region, `data-src` preferred over `src`.
	///
	/// DOM order is kept; elements with neither attribute are skipped.
	pub fn image_urls(&self, html: &str) -> Vec<String> {
		image_urls(html)
	}
}

/// See [`ContentSanitizer::image_urls`].
pub fn image_urls(html: &str) -> Vec<String> {
	let doc = Html::parse_fragment(html);
	let Ok(img) = Selector::parse("img") else {
		return Vec::new();
	};
	doc.select(&img)
		.filter_map(|el| {
			let value = el.value();
			[value.attr("data-src"), value.attr("src")]
				.into_iter()
				.flatten()
				.map(str::trim)
				.find(|url| !url.is_empty())
				.map(str::to_string)
		})
		.collect()
}

const VOID: &[&str] = &[
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT: &[&str] = &["style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript"];

/// The parser drops one newline right after these start tags.
const LEADING_NEWLINE: &[&str] = &["pre", "textarea", "listing"];

fn escape_text(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'\u{a0}' => out.push_str("&nbsp;"),
			c => out.push(c),
		}
	}
}

fn escape_attr(value: &str, out: &mut String) {
	for c in value.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'"' => out.push_str("&quot;"),
			'\u{a0}' => out.push_str("&nbsp;"),
			c => out.push(c),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const ARTICLE: &str = r#"<div id="js_article" class="rich_media">
<link rel="stylesheet" href="x.css">
<script>var biz = "MzA=";</script>
<div id="js_content" style="visibility: visible;">
  <p style="display: none;">hidden but kept</p>
  <p aria-hidden="true" class="lead">Hello &amp; welcome&nbsp;here</p>
  <img data-src="https://img/1.png" src="data:,">
  <div class="weui-dialog"><button class="weui-dialog__btn">OK</button></div>
  <span class="reward_area_carry_whisper hidden">tip</span>
  <pre>
indented</pre>
</div>
<div id="js_article_bottom_bar">bar</div>
<!-- comment -->
</div>"#;

	#[test]
	fn removes_denied_elements_and_attribute_pairs() {
		let out = ContentSanitizer::default().sanitize(ARTICLE);

		assert!(!out.contains("<script"));
		assert!(!out.contains("<link"));
		assert!(!out.contains("weui-dialog"));
		assert!(!out.contains("js_article_bottom_bar"));
		assert!(!out.contains("whisper"));
		assert!(!out.contains("display: none"));
		assert!(!out.contains("aria-hidden"));
		assert!(out.contains("<p>hidden but kept</p>"));
		assert!(out.contains(r#"<p class="lead">Hello &amp; welcome&nbsp;here</p>"#));
		assert!(out.contains(r#"style="visibility: visible;""#));
		assert!(out.contains("<!-- comment -->"));
	}

	#[test]
	fn second_pass_is_byte_identical() {
		let sanitizer = ContentSanitizer::default();
		for input in [
			ARTICLE,
			"",
			"plain text < 3 & more",
			"<table><tr><td>cell</td></tr></table>",
			"<p>unclosed <b>bold <i>both</b> italic</i>",
			"<pre>\n\nleading blank line</pre>",
			r#"<svg viewBox="0 0 1 1"><path d="M0 0"/></svg><textarea>a < b</textarea>"#,
			r#"<a href="?a=1&amp;b=&quot;2&quot;">link</a><br><img src="x.png">"#,
			"<plaintext>a<b>c</plaintext>",
			"<p>before</p><plaintext>x & y",
			"<div><p>nested <plaintext>tail</p></div>",
		] {
			let once = sanitizer.sanitize(input);
			let twice = sanitizer.sanitize(&once);
			assert_eq!(once, twice, "not idempotent for {input:?}");
		}
	}

	#[test]
	fn plaintext_is_not_closed() {
		let sanitizer = ContentSanitizer::default();
		let once = sanitizer.sanitize("<plaintext>a<b>c</plaintext>");
		assert_eq!(once.matches("</plaintext>").count(), 1, "{once}");
		assert_eq!(sanitizer.sanitize(&once), once);
	}

	#[test]
	fn custom_rules_apply() {
		let rules = SanitizeRules {
			remove_ids: vec!["drop".into()],
			remove_classes: vec![],
			remove_selectors: vec!["em".into()],
			strip_attributes: vec![AttributePair::new("data-x", "1")],
		};
		let sanitizer = ContentSanitizer::new(rules).unwrap();
		let out = sanitizer.sanitize(r#"<p data-x="1" data-y="2">a<em>b</em></p><i id="drop">c</i>"#);
		assert_eq!(out, r#"<p data-y="2">a</p>"#);
	}

	#[test]
	fn invalid_selector_is_config_error() {
		let rules = SanitizeRules {
			remove_selectors: vec!["[[".into()],
			..Default::default()
		};
		assert!(matches!(ContentSanitizer::new(rules), Err(HarvestError::Config(_))));
	}

	#[test]
	fn image_urls_prefer_lazy_source_and_skip_empty() {
		let html = r#"<img data-src="https://a/1.jpg" src="placeholder.gif">
			<img src="https://a/2.jpg">
			<img data-src="" src="">
			<img data-src="https://a/1.jpg">"#;
		assert_eq!(image_urls(html), vec!["https://a/1.jpg", "https://a/2.jpg", "https://a/1.jpg"]);
	}
}
