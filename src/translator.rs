//! Translation orchestration for content documents.
//!
//! A page is parsed into a tree, its paragraphs are serialized and grouped
//! into provider-sized batches, each batch is translated, and every
//! original paragraph is replaced by source/target paragraph pairs in place.

use crate::config::TranslationConfig;
use crate::dom::{Document, Element, NodeId, NodeKind};
use crate::error::{ProviderError, TranslationError};
use crate::group::{ParagraphGroup, ParagraphGrouper};
use crate::providers::{ContentType, TextProvider};
use crate::segment::SentenceSplitter;
use crate::utils::{escape_text, plain_text, preview, split_prologue, strip_paragraph_wrapper};
use futures::{StreamExt, TryStreamExt, stream};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wrapper used to parse translated fragments.
const FRAGMENT_WRAPPER: &str = "taiyaku-fragment";

/// A source fragment and its translation, both ready to embed as markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationPair {
    pub source_text: String,
    pub target_text: String,
}

/// Pairs accumulated per paragraph index, in cell order.
pub type PairMap = BTreeMap<usize, Vec<TranslationPair>>;

/// Drives grouping, provider calls and reconstruction for pages and
/// metadata strings.
pub struct Translator {
    /// Backend used for every call made by this translator.
    provider: Arc<dyn TextProvider>,
    /// Translation behavior configuration.
    config: TranslationConfig,
}

impl Translator {
    /// Create a new Translator.
    pub fn new(provider: Arc<dyn TextProvider>, config: TranslationConfig) -> Self {
        Self { provider, config }
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Translates a single plain-text string such as a title.
    ///
    /// Blank input is returned as is, and so is the input when the provider
    /// answers with no results.
    pub async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        let payloads = vec![text.to_string()];
        let result = self
            .provider
            .translate(
                &payloads,
                ContentType::Plain,
                &self.config.source_language_code,
                &self.config.target_language_code,
            )
            .await;

        match result {
            Ok(translations) => match translations.into_iter().next() {
                Some(translated) => Ok(translated),
                None => {
                    warn!("Provider returned nothing for {:?}", preview(text, 40));
                    Ok(text.to_string())
                }
            },
            Err(source) => Err(TranslationError::Provider { source, payloads }),
        }
    }

    /// Translates a content document, returning bilingual markup.
    ///
    /// Every paragraph is replaced by its source and translated text as two
    /// sibling paragraphs. Any provider failure aborts the whole page.
    pub async fn translate_page(&self, markup: &str) -> Result<String, TranslationError> {
        let (prologue, body) = split_prologue(markup);
        let mut doc = Document::parse_html(body)?;

        let root = doc.root_element();
        let declarations = root
            .map(|root| doc.take_namespace_declarations(root))
            .unwrap_or_default();

        let paragraphs = collect_paragraphs(&doc);
        let texts: Vec<String> = paragraphs
            .iter()
            .map(|id| doc.outer_markup(*id))
            .collect();

        let pairs = self.translate_paragraphs(&texts).await?;
        rebuild_paragraphs(&mut doc, &paragraphs, &pairs)?;

        if let Some(root) = root {
            doc.restore_attributes(root, declarations);
        }

        Ok(format!("{}{}", prologue, doc.serialize()))
    }

    /// Groups serialized paragraphs and translates every group.
    ///
    /// Keys are paragraph indices; a segmented paragraph collects one pair
    /// per cell. Context cells repeated across a group boundary are sent to
    /// the provider again but never produce a second pair.
    pub async fn translate_paragraphs(&self, texts: &[String]) -> Result<PairMap, TranslationError> {
        let grouper = ParagraphGrouper::new(
            SentenceSplitter,
            self.config.max_paragraph_characters,
            self.config.max_group_characters,
        )
        .include_short_paragraphs(self.config.translate_short_paragraphs);
        let groups = grouper.group(texts);

        info!(
            "Translating {} paragraphs in {} groups via {}",
            texts.len(),
            groups.len(),
            self.provider.name()
        );

        let batches: Vec<Vec<(usize, TranslationPair)>> = stream::iter(groups.iter().enumerate())
            .map(|(number, group)| self.translate_group(number, group))
            .buffered(self.config.max_concurrent_requests.max(1))
            .try_collect()
            .await?;

        let mut pairs = PairMap::new();
        for (origin_index, pair) in batches.into_iter().flatten() {
            pairs.entry(origin_index).or_default().push(pair);
        }
        Ok(pairs)
    }

    fn content_type(&self) -> ContentType {
        if self.config.clean_format {
            ContentType::Plain
        } else {
            ContentType::Html
        }
    }

    async fn translate_group(
        &self,
        number: usize,
        group: &ParagraphGroup,
    ) -> Result<Vec<(usize, TranslationPair)>, TranslationError> {
        let content_type = self.content_type();
        let sources: Vec<String> = group
            .cells()
            .iter()
            .map(|cell| self.normalize_source(&cell.text))
            .collect();

        debug!(
            "Group {}: {} cells ({} context), {} chars, starts {:?}",
            number + 1,
            group.len(),
            group.context().len(),
            group.text_len(),
            preview(sources.first().map(String::as_str).unwrap_or(""), 40)
        );

        let targets = self.dispatch(&sources, content_type).await?;
        let skip = group.context().len();

        Ok(group
            .cells()
            .iter()
            .zip(sources.into_iter().zip(targets))
            .skip(skip)
            .map(|(cell, (source, target))| {
                let pair = TranslationPair {
                    source_text: self.embed_source(source),
                    target_text: self.embed_target(&target),
                };
                (cell.origin_index, pair)
            })
            .collect())
    }

    /// Sends a batch, skipping blank entries; skipped positions resolve to
    /// empty strings.
    async fn dispatch(
        &self,
        contents: &[String],
        content_type: ContentType,
    ) -> Result<Vec<String>, TranslationError> {
        let mut outputs = vec![String::new(); contents.len()];
        let (positions, payloads): (Vec<usize>, Vec<String>) = contents
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(position, text)| (position, text.clone()))
            .unzip();

        if payloads.is_empty() {
            return Ok(outputs);
        }

        let result = self
            .provider
            .translate(
                &payloads,
                content_type,
                &self.config.source_language_code,
                &self.config.target_language_code,
            )
            .await;

        let translations = match result {
            Ok(translations) if translations.len() == payloads.len() => translations,
            Ok(translations) => {
                let source = ProviderError::CountMismatch {
                    expected: payloads.len(),
                    actual: translations.len(),
                };
                return Err(TranslationError::Provider { source, payloads });
            }
            Err(source) => return Err(TranslationError::Provider { source, payloads }),
        };

        for (position, translation) in positions.into_iter().zip(translations) {
            outputs[position] = translation;
        }
        Ok(outputs)
    }

    fn normalize_source(&self, cell: &str) -> String {
        let inner = strip_paragraph_wrapper(cell);
        if self.config.clean_format {
            plain_text(&inner)
        } else {
            inner
        }
    }

    fn embed_source(&self, source: String) -> String {
        if self.config.clean_format {
            escape_text(&source)
        } else {
            source
        }
    }

    fn embed_target(&self, target: &str) -> String {
        if self.config.clean_format {
            escape_text(target)
        } else {
            strip_paragraph_wrapper(target)
        }
    }
}

/// Paragraph elements in document order, skipping paragraphs nested in another.
fn collect_paragraphs(doc: &Document) -> Vec<NodeId> {
    let is_paragraph = |id: NodeId| doc.element(id).is_some_and(|el| el.local_name() == "p");
    doc.descendants(doc.root())
        .into_iter()
        .filter(|id| is_paragraph(*id))
        .filter(|id| {
            let mut parent = doc.parent(*id);
            while let Some(ancestor) = parent {
                if is_paragraph(ancestor) {
                    return false;
                }
                parent = doc.parent(ancestor);
            }
            true
        })
        .collect()
}

/// Replaces each paragraph that has pairs with its source/target paragraphs.
/// Paragraphs without pairs are left untouched.
fn rebuild_paragraphs(
    doc: &mut Document,
    paragraphs: &[NodeId],
    pairs: &PairMap,
) -> Result<(), TranslationError> {
    for (index, &original) in paragraphs.iter().enumerate() {
        let Some(list) = pairs.get(&index) else {
            continue;
        };
        let Some(template) = doc.element(original).cloned() else {
            continue;
        };

        let mut replacement = Vec::with_capacity(list.len() * 2);
        for (n, pair) in list.iter().enumerate() {
            replacement.push(new_paragraph(doc, &template, &pair.source_text, n == 0));
            replacement.push(new_paragraph(doc, &template, &pair.target_text, false));
        }

        for node in replacement {
            doc.insert_before(original, node)?;
        }
        doc.detach(original);
    }
    Ok(())
}

/// Builds a paragraph shaped like `template` holding `inner` markup.
///
/// Only the first source paragraph keeps the `id`, so anchors stay unique.
fn new_paragraph(doc: &mut Document, template: &Element, inner: &str, keep_id: bool) -> NodeId {
    let element = Element {
        name: template.name.clone(),
        attributes: template
            .attributes
            .iter()
            .filter(|attr| keep_id || attr.key != "id")
            .cloned()
            .collect(),
        self_closing: false,
    };
    let paragraph = doc.create(NodeKind::Element(element));

    let wrapped = format!("<{0}>{1}</{0}>", FRAGMENT_WRAPPER, inner);
    match Document::parse_html(&wrapped) {
        Ok(fragment) => {
            if let Some(wrapper) = fragment.root_element() {
                for child in fragment.children(wrapper) {
                    let copy = doc.import(&fragment, *child);
                    doc.append_child(paragraph, copy);
                }
            }
        }
        Err(err) => {
            debug!("Embedding unparsable fragment as text: {}", err);
            doc.set_text(paragraph, escape_text(&plain_text(inner)));
        }
    }

    paragraph
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Mode {
        Identity,
        Bracket,
        NoResults,
        Failing,
    }

    /// Provider that records every batch it receives.
    struct RecordingProvider {
        mode: Mode,
        calls: Mutex<Vec<(Vec<String>, ContentType)>>,
    }

    impl RecordingProvider {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                mode,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Vec<String>, ContentType)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "Recording"
        }

        async fn translate(
            &self,
            contents: &[String],
            content_type: ContentType,
            _source_language: &str,
            _target_language: &str,
        ) -> Result<Vec<String>, ProviderError> {
            self.calls
                .lock()
                .unwrap()
                .push((contents.to_vec(), content_type));
            match self.mode {
                Mode::Identity => Ok(contents.to_vec()),
                Mode::Bracket => Ok(contents.iter().map(|c| format!("[{}]", c)).collect()),
                Mode::NoResults => Ok(Vec::new()),
                Mode::Failing => Err(ProviderError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                }),
            }
        }
    }

    fn config() -> TranslationConfig {
        TranslationConfig::default()
    }

    const PAGE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Ch</title></head>
<body>
<p class="x" id="p1">Hello   <i>world</i>.</p>
<p>Line<br/>break</p>
<p></p>
</body>
</html>"#;

    #[tokio::test]
    async fn test_translate_returns_first_result() {
        let provider = RecordingProvider::new(Mode::Bracket);
        let translator = Translator::new(provider.clone(), config());

        assert_eq!(translator.translate("Title").await.unwrap(), "[Title]");
        let calls = provider.calls();
        assert_eq!(calls, vec![(vec!["Title".to_string()], ContentType::Plain)]);
    }

    #[tokio::test]
    async fn test_translate_without_results_returns_input() {
        let translator = Translator::new(RecordingProvider::new(Mode::NoResults), config());
        assert_eq!(translator.translate("Title").await.unwrap(), "Title");
    }

    #[tokio::test]
    async fn test_translate_blank_skips_provider() {
        let provider = RecordingProvider::new(Mode::Bracket);
        let translator = Translator::new(provider.clone(), config());
        assert_eq!(translator.translate("  ").await.unwrap(), "  ");
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_translate_error_carries_payload() {
        let translator = Translator::new(RecordingProvider::new(Mode::Failing), config());
        let err = translator.translate("Title").await.unwrap_err();
        assert_eq!(err.payloads().unwrap(), &["Title".to_string()]);
    }

    #[tokio::test]
    async fn test_identity_page_duplicates_paragraphs() {
        let provider = RecordingProvider::new(Mode::Identity);
        let translator = Translator::new(provider.clone(), config());

        let output = translator.translate_page(PAGE).await.unwrap();
        let expected = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Ch</title></head>
<body>
<p class="x" id="p1">Hello <i>world</i>.</p><p class="x">Hello <i>world</i>.</p>
<p>Line<br/>break</p><p>Line<br/>break</p>
<p></p><p></p>
</body>
</html>"#;
        assert_eq!(output, expected);

        // Blank paragraphs never reach the provider.
        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            (
                vec!["Hello <i>world</i>.".to_string(), "Line<br/>break".to_string()],
                ContentType::Html
            )
        );
    }

    #[tokio::test]
    async fn test_identity_page_pairs_are_equal() {
        let translator = Translator::new(RecordingProvider::new(Mode::Identity), config());
        let output = translator.translate_page(PAGE).await.unwrap();

        let doc = Document::parse(split_prologue(&output).1).unwrap();
        let paragraphs = collect_paragraphs(&doc);
        assert_eq!(paragraphs.len(), 6);
        for pair in paragraphs.chunks(2) {
            assert_eq!(doc.inner_markup(pair[0]), doc.inner_markup(pair[1]));
        }
    }

    #[tokio::test]
    async fn test_every_paragraph_gets_a_pair() {
        let translator = Translator::new(RecordingProvider::new(Mode::Bracket), config());
        let texts: Vec<String> = ["<p>a</p>", "<p></p>", "<p>c</p>"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let pairs = translator.translate_paragraphs(&texts).await.unwrap();
        assert_eq!(pairs.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(pairs.values().all(|list| !list.is_empty()));
        assert_eq!(
            pairs[&0],
            vec![TranslationPair {
                source_text: "a".to_string(),
                target_text: "[a]".to_string()
            }]
        );
        // Whitespace-only cells still yield an empty pair.
        assert_eq!(pairs[&1][0].target_text, "");
    }

    #[tokio::test]
    async fn test_clean_format_sends_plain_text() {
        let provider = RecordingProvider::new(Mode::Bracket);
        let mut config = config();
        config.clean_format = true;
        let translator = Translator::new(provider.clone(), config);

        let output = translator
            .translate_page("<body><p>a &lt; b <b>bold</b></p></body>")
            .await
            .unwrap();

        assert_eq!(
            output,
            "<body><p>a &lt; b bold</p><p>[a &lt; b bold]</p></body>"
        );
        assert_eq!(
            provider.calls(),
            vec![(vec!["a < b bold".to_string()], ContentType::Plain)]
        );
    }

    #[tokio::test]
    async fn test_provider_failure_aborts_page() {
        let translator = Translator::new(RecordingProvider::new(Mode::Failing), config());
        let err = translator.translate_page(PAGE).await.unwrap_err();

        match err {
            TranslationError::Provider { source, payloads } => {
                assert!(matches!(source, ProviderError::Api { status: 503, .. }));
                assert_eq!(payloads, vec!["Hello <i>world</i>.", "Line<br/>break"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_count_mismatch_is_provider_error() {
        let translator = Translator::new(RecordingProvider::new(Mode::NoResults), config());
        let err = translator.translate_page(PAGE).await.unwrap_err();
        assert!(matches!(
            err,
            TranslationError::Provider {
                source: ProviderError::CountMismatch {
                    expected: 2,
                    actual: 0
                },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_segmented_paragraph_keeps_id_once() {
        let mut config = config();
        config.max_paragraph_characters = 30;
        let translator = Translator::new(RecordingProvider::new(Mode::Identity), config);

        let output = translator
            .translate_page(r#"<body><p id="long">First sentence here. Second sentence here.</p></body>"#)
            .await
            .unwrap();

        assert_eq!(
            output,
            concat!(
                r#"<body><p id="long">First sentence here.</p><p>First sentence here.</p>"#,
                r#"<p>Second sentence here.</p><p>Second sentence here.</p></body>"#
            )
        );
    }

    #[tokio::test]
    async fn test_segmented_paragraph_keeps_inline_markup() {
        let mut config = config();
        config.max_paragraph_characters = 10;
        let translator = Translator::new(RecordingProvider::new(Mode::Identity), config);

        let output = translator
            .translate_page("<body><p>Start <b>one. two.</b> end.</p></body>")
            .await
            .unwrap();

        assert_eq!(
            output,
            concat!(
                "<body><p>Start <b>one. two.</b></p><p>Start <b>one. two.</b></p>",
                "<p>end.</p><p>end.</p></body>"
            )
        );
    }

    #[tokio::test]
    async fn test_context_cells_translated_but_not_duplicated() {
        let provider = RecordingProvider::new(Mode::Identity);
        let mut config = config();
        config.max_group_characters = 30;
        let translator = Translator::new(provider.clone(), config);

        let texts: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| format!("<p>{}</p>", s))
            .collect();
        let pairs = translator.translate_paragraphs(&texts).await.unwrap();

        let batches: Vec<Vec<String>> = provider.calls().into_iter().map(|(c, _)| c).collect();
        assert_eq!(batches, vec![vec!["a", "b", "c"], vec!["b", "c", "d"], vec!["c", "d", "e"]]);
        assert_eq!(pairs.len(), 5);
        assert!(pairs.values().all(|list| list.len() == 1));
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_matches_sequential() {
        let page = (0..12)
            .map(|i| format!("<p>Paragraph number {}.</p>", i))
            .collect::<String>();
        let page = format!("<body>{}</body>", page);

        let mut sequential = config();
        sequential.max_group_characters = 80;
        let mut concurrent = sequential.clone();
        concurrent.max_concurrent_requests = 4;

        let a = Translator::new(RecordingProvider::new(Mode::Bracket), sequential)
            .translate_page(&page)
            .await
            .unwrap();
        let b = Translator::new(RecordingProvider::new(Mode::Bracket), concurrent)
            .translate_page(&page)
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_short_paragraphs_left_alone_when_excluded() {
        let mut config = config();
        config.translate_short_paragraphs = false;
        config.max_paragraph_characters = 20;
        let translator = Translator::new(RecordingProvider::new(Mode::Bracket), config);

        let output = translator
            .translate_page("<body><p>Short.</p><p>This one is long. It splits.</p></body>")
            .await
            .unwrap();

        assert_eq!(
            output,
            concat!(
                "<body><p>Short.</p>",
                "<p>This one is long.</p><p>[This one is long.]</p>",
                "<p>It splits.</p><p>[It splits.]</p></body>"
            )
        );
    }

    #[tokio::test]
    async fn test_markup_outside_paragraphs_is_untouched() {
        let translator = Translator::new(RecordingProvider::new(Mode::Identity), config());
        let page = r#"<body><p>x</p><img alt="a > b" src="x.png"/><!-- <br> --></body>"#;

        let output = translator.translate_page(page).await.unwrap();
        assert_eq!(
            output,
            r#"<body><p>x</p><p>x</p><img alt="a > b" src="x.png"/><!-- <br> --></body>"#
        );
    }

    #[tokio::test]
    async fn test_sloppy_text_is_recovered() {
        let provider = RecordingProvider::new(Mode::Identity);
        let translator = Translator::new(provider.clone(), config());

        let output = translator
            .translate_page("<body><p>Tom & Jerry</p><p>x < y</p></body>")
            .await
            .unwrap();
        assert_eq!(
            output,
            "<body><p>Tom &amp; Jerry</p><p>Tom &amp; Jerry</p><p>x &lt; y</p><p>x &lt; y</p></body>"
        );
        assert_eq!(
            provider.calls()[0].0,
            vec!["Tom &amp; Jerry".to_string(), "x &lt; y".to_string()]
        );
    }

    #[tokio::test]
    async fn test_void_elements_in_translation_are_self_closed() {
        struct BreakProvider;

        #[async_trait]
        impl TextProvider for BreakProvider {
            fn name(&self) -> &'static str {
                "Break"
            }

            async fn translate(
                &self,
                contents: &[String],
                _content_type: ContentType,
                _source_language: &str,
                _target_language: &str,
            ) -> Result<Vec<String>, ProviderError> {
                Ok(contents.iter().map(|c| format!("<p>{}<br></p>", c)).collect())
            }
        }

        let translator = Translator::new(Arc::new(BreakProvider), config());
        let output = translator.translate_page("<body><p>x</p></body>").await.unwrap();
        assert_eq!(output, "<body><p>x</p><p>x<br/></p></body>");
    }
}
