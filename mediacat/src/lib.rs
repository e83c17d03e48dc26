//! Catalog consistency engine for media files spread over a local disk,
//! a network-attached mirror and a cloud mirror.
//!
//! The crate keeps one searchable index coherent with the physical copies:
//! content-addressed identity ([`utils::hash::ContentHasher`]), duplicate
//! suppressing ingestion ([`catalog::ingest::IngestionStore`]), intra-directory
//! deduplication ([`catalog::dedup::DirectoryDeduplicator`]), three-way
//! reconciliation ([`catalog::reconcile::DiskCatalogReconciler`]) and mirror
//! pushes with rollback ([`catalog::relocate::BatchRelocator`]).

pub mod catalog;
pub mod common;
pub mod file;
pub mod index;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod tests;
