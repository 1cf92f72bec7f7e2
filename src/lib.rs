//! Taiyaku - bilingual e-book translator.
//!
//! This library provides functionality for:
//! - Reading and editing the package document of an extracted EPUB
//!   (title, creators, reading order)
//! - Splitting page paragraphs into provider-sized request groups that
//!   carry context across batches
//! - Rebuilding each page with source and translated paragraphs side by side

pub mod book;
pub mod config;
pub mod console;
pub mod container;
pub mod dom;
pub mod error;
pub mod group;
pub mod package;
pub mod providers;
pub mod segment;
pub mod translator;
pub mod utils;

// Re-export commonly used types
pub use book::{BookOptions, BookReport, translate_book};
pub use config::Config;
pub use console::{Console, ConsoleLogger};
pub use error::{BookError, ConfigError, ContainerError, DocumentError, ProviderError, TranslationError};
pub use group::{Paragraph, ParagraphGroup, ParagraphGrouper};
pub use package::{ContentDocument, SpineItem};
pub use providers::{ContentType, EchoProvider, GoogleTranslateProvider, TextProvider};
pub use segment::{SegmentSplitter, SentenceSplitter};
pub use translator::{TranslationPair, Translator};
