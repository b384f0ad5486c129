// Copyright 2023-2025 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

extern crate adac_host;

use adac_host::cert::CertificateChain;
use adac_host::protocol::MAX_EXTENSIONS;
use std::fs;

fn main() {
    chain_dump();
}

fn chain_dump() {
    let files = vec!["testdata/chain.bin"];

    for f in files {
        let buf = fs::read(f).unwrap_or_else(|_| panic!("loading file {}", f));

        let chain = CertificateChain::parse(&buf, MAX_EXTENSIONS).unwrap();

        for c in chain.certificates() {
            let c = c.unwrap();
            println!(
                "#{} {:?} key={:?} soc_class=0x{:08x}",
                c.index,
                c.role(),
                c.header.key_type(),
                c.header.soc_class
            );
        }

        println!("cryptosystem: {}", chain.detect_cryptosystem().unwrap());
        println!("scope: {:?}", chain.check_scope());
    }
}
