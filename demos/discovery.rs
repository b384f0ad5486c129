// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

extern crate adac_host;

use adac_host::session::Session;
use adac_host::transport::{connect_tcp, DEFAULT_BUFFER_SIZE};
use std::time::Duration;

fn main() {
    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "localhost:9000".to_string());

    discovery(&endpoint);
}

fn discovery(endpoint: &str) {
    let link = connect_tcp(endpoint, Some(Duration::from_secs(5)))
        .unwrap_or_else(|e| panic!("connecting to {}: {:?}", endpoint, e));

    let mut s = Session::new(link, DEFAULT_BUFFER_SIZE).unwrap();

    let d = s.discover(&[]).unwrap();

    for r in d.records() {
        println!("0x{:04x}: {}", r.type_id, hex::encode(&r.value));
    }

    println!("lifecycle: {:?}", d.lifecycle());
    println!("cryptosystems: {:?}", d.cryptosystems());

    s.close().unwrap();
}
