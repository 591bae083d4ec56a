#![cfg(test)]

// Test-only fixtures shared by unit tests.
use bson::{Document, doc};

use crate::store::memory::MemoryStore;

/// A book document with the fields the runner queries.
pub fn book(title: &str, author: &str, genre: &str, year: i32, price: f64, in_stock: bool) -> Document {
    doc! {
        "title": title,
        "author": author,
        "genre": genre,
        "published_year": year,
        "price": price,
        "in_stock": in_stock,
    }
}

/// Small mixed catalogue: two authors with several books, one genre with three.
pub fn small_catalogue() -> Vec<Document> {
    vec![
        book("Dune", "Frank Herbert", "Science Fiction", 1965, 11.99, true),
        book("Dune Messiah", "Frank Herbert", "Science Fiction", 1969, 9.99, false),
        book("Project Hail Mary", "Andy Weir", "Science Fiction", 2021, 18.99, true),
        book("Emma", "Jane Austen", "Romance", 1815, 6.50, true),
        book("Persuasion", "Jane Austen", "Romance", 1817, 7.50, true),
        book("Northanger Abbey", "Jane Austen", "Romance", 1817, 5.00, false),
    ]
}

pub fn catalogue_store() -> MemoryStore {
    MemoryStore::with_documents("test_db", "books", small_catalogue()).unwrap_or_else(|e| panic!("{e}"))
}
