use bson::{Document, doc};
use bookstore_queries::{BookStore, FindOptions, MemoryStore};
use proptest::prelude::*;

fn store_with(prices: &[(i32, f64)]) -> MemoryStore {
    let docs: Vec<Document> = prices
        .iter()
        .enumerate()
        .map(|(i, (year, price))| doc! {"_id": i64::try_from(i).unwrap(), "published_year": *year, "price": *price})
        .collect();
    MemoryStore::with_documents("prop", "books", docs).unwrap()
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn prop_desc_is_reverse_of_asc_for_distinct_prices(set in proptest::collection::btree_set(0u32..100_000, 0..40)) {
        let rows: Vec<(i32, f64)> = set.iter().map(|p| (2000, f64::from(*p) / 100.0)).collect();
        let s = store_with(&rows);
        let asc = block_on(s.find(doc! {}, FindOptions::default().sort(doc! {"price": 1}))).unwrap();
        let mut desc = block_on(s.find(doc! {}, FindOptions::default().sort(doc! {"price": -1}))).unwrap();
        desc.reverse();
        prop_assert_eq!(asc, desc);
    }

    #[test]
    fn prop_sort_is_stable_and_non_decreasing(rows in proptest::collection::vec((1990i32..2030, 0u8..5), 0..50)) {
        let rows: Vec<(i32, f64)> = rows.into_iter().map(|(y, p)| (y, f64::from(p))).collect();
        let s = store_with(&rows);
        let asc = block_on(s.find(doc! {}, FindOptions::default().sort(doc! {"price": 1}))).unwrap();
        for w in asc.windows(2) {
            let (a, b) = (w[0].get_f64("price").unwrap(), w[1].get_f64("price").unwrap());
            prop_assert!(a <= b);
            if a == b {
                prop_assert!(w[0].get_i64("_id").unwrap() < w[1].get_i64("_id").unwrap());
            }
        }
    }

    #[test]
    fn prop_page_is_prefix(rows in proptest::collection::vec((1990i32..2030, 0u8..50), 0..30), limit in 1i64..10) {
        let rows: Vec<(i32, f64)> = rows.into_iter().map(|(y, p)| (y, f64::from(p))).collect();
        let s = store_with(&rows);
        let all = block_on(s.find(doc! {}, FindOptions::default())).unwrap();
        let page = block_on(s.find(doc! {}, FindOptions::default().skip(0).limit(limit))).unwrap();
        prop_assert!(page.len() <= usize::try_from(limit).unwrap());
        prop_assert_eq!(&page[..], &all[..page.len()]);
    }

    #[test]
    fn prop_year_filter_is_exact_subset(rows in proptest::collection::vec((1990i32..2030, 0u8..50), 0..40)) {
        let rows: Vec<(i32, f64)> = rows.into_iter().map(|(y, p)| (y, f64::from(p))).collect();
        let s = store_with(&rows);
        let got = block_on(s.find(doc! {"published_year": {"$gt": 2015}}, FindOptions::default())).unwrap();
        let want: Vec<Document> = s.snapshot().into_iter().filter(|d| d.get_i32("published_year").unwrap() > 2015).collect();
        prop_assert_eq!(got, want);
    }
}
