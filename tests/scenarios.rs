//! End-to-end scenarios over minimal documents built from literals.

use pdfcraft::config::{CancelFlag, Configuration, ValidationMode};
use pdfcraft::document::Document;
use pdfcraft::encryption::{AuthMode, EncryptionState, StandardSecurityHandler};
use pdfcraft::objects::{Object, ObjectId};
use pdfcraft::pages::{insert_blank_page, remove_pages, PageSelection};
use pdfcraft::writer;
use pdfcraft::PdfError;
use std::collections::BTreeSet;

/// Assemble numbered bodies (object 1 first) into a classic-xref file.
/// `trailer_extra` is spliced into the trailer dictionary.
fn assemble(bodies: &[Vec<u8>], trailer_extra: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::new();
    for body in bodies {
        offsets.push(out.len());
        out.extend_from_slice(body);
        if !body.ends_with(b"\n") {
            out.push(b'\n');
        }
    }

    let xref_pos = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", bodies.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R{} >>\n",
            bodies.len() + 1,
            trailer_extra
        )
        .as_bytes(),
    );
    out.extend_from_slice(format!("startxref\n{xref_pos}\n%%EOF\n").as_bytes());
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

/// An n-page document whose page i carries the content stream
/// `Page i content`.
fn n_page_pdf(n: usize) -> Vec<u8> {
    let mut bodies: Vec<Vec<u8>> = Vec::new();
    bodies.push(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec());

    let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", 2 * i + 3)).collect();
    bodies.push(
        format!(
            "2 0 obj\n<< /Type /Pages /Kids [{}] /Count {n} >>\nendobj\n",
            kids.join(" ")
        )
        .into_bytes(),
    );

    for i in 0..n {
        let page_num = 2 * i + 3;
        let content_num = 2 * i + 4;
        bodies.push(
            format!(
                "{page_num} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents {content_num} 0 R >>\nendobj\n"
            )
            .into_bytes(),
        );
        let content = format!("BT (Page {}) Tj ET", i + 1);
        bodies.push(
            format!(
                "{content_num} 0 obj\n<< /Length {} >>\nstream\n{content}\nendstream\nendobj\n",
                content.len()
            )
            .into_bytes(),
        );
    }
    assemble(&bodies, "")
}

fn page_contents(doc: &mut Document) -> Vec<Vec<u8>> {
    let pages = doc.pages().unwrap();
    pages
        .into_iter()
        .map(|p| doc.page_content(p).unwrap())
        .collect()
}

// S1: a 3-object PDF with one page.
#[test]
fn s1_read_minimal_document() {
    let bodies = vec![
        b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec(),
        b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n".to_vec(),
        b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n".to_vec(),
    ];
    let mut doc = Document::from_bytes(assemble(&bodies, ""), Configuration::default()).unwrap();

    assert_eq!(doc.page_count().unwrap(), 1);
    let catalog = doc.catalog().unwrap();
    let pages = doc.resolve(catalog.get_required(b"Pages").unwrap()).unwrap();
    assert!(pages.as_dict().unwrap().is_type(b"Pages"));
}

// S2: FlateDecode round-trip of `hello world` through a full rewrite.
#[test]
fn s2_flate_stream_roundtrip() {
    let mut doc = Document::from_bytes(n_page_pdf(1), Configuration::default()).unwrap();

    let mut dict = pdfcraft::Dictionary::new();
    dict.set("Filter", Object::name("FlateDecode"));
    let mut stream = pdfcraft::Stream::with_data(dict, Vec::new());
    stream.replace_content(b"hello world".to_vec());
    let id = doc.add_object(Object::Stream(stream));

    // Reference it from the catalog so it survives a rewrite untouched
    // by any sweep.
    let mut catalog = doc.catalog().unwrap();
    catalog.set("PieceInfo", Object::Reference(id));
    doc.set_object(ObjectId::new(1, 0), Object::Dictionary(catalog));

    let bytes = writer::write_full(&mut doc, "s2.pdf", &CancelFlag::new()).unwrap();
    let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();

    let object = reread.get(id).unwrap();
    let stream = object.as_stream().unwrap();
    assert!(stream.declared_length().unwrap() > 0);
    assert_eq!(stream.decoded_data(), Some(b"hello world".as_ref()));
}

// S3: RC4-40 authentication modes with P = -4.
#[test]
fn s3_rc4_40_authentication() {
    let file_id = b"0123456789abcdef".to_vec();
    let owner_hash = StandardSecurityHandler::compute_owner_hash(b"owner", b"user", 2, 5);
    let mut handler = StandardSecurityHandler {
        revision: 2,
        key_length: 5,
        owner_hash,
        user_hash: Vec::new(),
        permissions: -4,
        file_id: file_id.clone(),
        encrypt_metadata: true,
    };
    let file_key = handler.compute_file_key(b"user");
    handler.user_hash = handler.compute_user_hash(&file_key);

    let bodies = vec![
        b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec(),
        b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n".to_vec(),
        b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n".to_vec(),
        format!(
            "4 0 obj\n<< /Filter /Standard /V 1 /R 2 /Length 40 /O <{}> /U <{}> /P -4 >>\nendobj\n",
            hex(&handler.owner_hash),
            hex(&handler.user_hash)
        )
        .into_bytes(),
    ];
    let trailer_extra = format!(" /Encrypt 4 0 R /ID [<{0}> <{0}>]", hex(&file_id));
    let data = assemble(&bodies, &trailer_extra);

    // Empty password is denied.
    assert!(matches!(
        Document::from_bytes(data.clone(), Configuration::default()),
        Err(PdfError::PasswordRequired)
    ));

    let doc = Document::from_bytes(
        data.clone(),
        Configuration::default().with_passwords(b"user", b""),
    )
    .unwrap();
    assert_eq!(doc.encryption().unwrap().auth_mode(), AuthMode::User);

    let doc = Document::from_bytes(
        data,
        Configuration::default().with_passwords(b"", b"owner"),
    )
    .unwrap();
    assert_eq!(doc.encryption().unwrap().auth_mode(), AuthMode::Owner);
}

// S4: AES-128 string in object 7 0; per-object key is 16 bytes.
#[test]
fn s4_aes_string_roundtrip() {
    let file_id = b"fedcba9876543210".to_vec();
    let owner_hash = StandardSecurityHandler::compute_owner_hash(b"owner", b"user", 4, 16);
    let mut handler = StandardSecurityHandler {
        revision: 4,
        key_length: 16,
        owner_hash,
        user_hash: Vec::new(),
        permissions: -4,
        file_id: file_id.clone(),
        encrypt_metadata: true,
    };
    let file_key = handler.compute_file_key(b"user");
    let mut user_hash = handler.compute_user_hash(&file_key);
    user_hash.resize(32, 0);
    handler.user_hash = user_hash;

    let encrypt_body = format!(
        "5 0 obj\n<< /Filter /Standard /V 4 /R 4 /Length 128 \
         /CF << /StdCF << /Type /CryptFilter /CFM /AESV2 /Length 16 >> >> \
         /StmF /StdCF /StrF /StdCF \
         /O <{}> /U <{}> /P -4 >>\nendobj\n",
        hex(&handler.owner_hash),
        hex(&handler.user_hash)
    );

    // Use the crypt state itself to produce object 7's ciphertext.
    let probe = Document::from_bytes(
        assemble(
            &[
                b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec(),
                b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n".to_vec(),
                b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n"
                    .to_vec(),
                b"4 0 obj\nnull\nendobj\n".to_vec(),
                encrypt_body.clone().into_bytes(),
            ],
            &format!(" /Encrypt 5 0 R /ID [<{0}> <{0}>]", hex(&file_id)),
        ),
        Configuration::default().with_passwords(b"user", b""),
    )
    .unwrap();
    let state: &EncryptionState = probe.encryption().unwrap();
    assert_eq!(
        state
            .handler
            .object_key(state.file_key(), 7, 0, true)
            .len(),
        16
    );
    let ciphertext = state
        .encrypt_string(ObjectId::new(7, 0), b"secret")
        .unwrap();

    let bodies = vec![
        b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec(),
        b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n".to_vec(),
        b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>\nendobj\n".to_vec(),
        b"4 0 obj\nnull\nendobj\n".to_vec(),
        encrypt_body.into_bytes(),
        b"6 0 obj\nnull\nendobj\n".to_vec(),
        format!("7 0 obj\n<{}>\nendobj\n", hex(&ciphertext)).into_bytes(),
    ];
    let data = assemble(
        &bodies,
        &format!(" /Encrypt 5 0 R /ID [<{0}> <{0}>]", hex(&file_id)),
    );

    let mut doc = Document::from_bytes(
        data,
        Configuration::default().with_passwords(b"user", b""),
    )
    .unwrap();
    let secret = doc.get(ObjectId::new(7, 0)).unwrap();
    assert_eq!(secret.as_string(), Some(b"secret".as_ref()));
}

// S5: trimming page 2 of three leaves pages 1 and 3.
#[test]
fn s5_trim_middle_page() {
    let mut doc = Document::from_bytes(n_page_pdf(3), Configuration::default()).unwrap();
    let original = page_contents(&mut doc);
    assert_eq!(original.len(), 3);

    let selection = PageSelection::parse("2").unwrap();
    let selected = selection.resolve(3, ValidationMode::Relaxed).unwrap();
    remove_pages(&mut doc, &selected).unwrap();

    let bytes = writer::write_full(&mut doc, "s5.pdf", &CancelFlag::new()).unwrap();
    let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();

    assert_eq!(reread.page_count().unwrap(), 2);
    let contents = page_contents(&mut reread);
    assert_eq!(contents[0], original[0]);
    assert_eq!(contents[1], original[2]);
}

// S6: inserting an empty page before page 1 of five shifts the rest.
#[test]
fn s6_insert_blank_page_shifts_pages() {
    let mut doc = Document::from_bytes(n_page_pdf(5), Configuration::default()).unwrap();
    let original = page_contents(&mut doc);

    insert_blank_page(&mut doc, 1).unwrap();
    let bytes = writer::write_full(&mut doc, "s6.pdf", &CancelFlag::new()).unwrap();
    let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();

    assert_eq!(reread.page_count().unwrap(), 6);
    let contents = page_contents(&mut reread);
    assert!(contents[0].is_empty());
    for i in 0..5 {
        assert_eq!(contents[i + 1], original[i], "page {} shifted", i + 1);
    }
}

// Invariant 1: write(read(D)) is accepted and equivalent.
#[test]
fn rewrite_roundtrip_preserves_structure() {
    let mut doc = Document::from_bytes(n_page_pdf(4), Configuration::default()).unwrap();
    let original = page_contents(&mut doc);

    let bytes = writer::write_full(&mut doc, "roundtrip.pdf", &CancelFlag::new()).unwrap();
    let mut reread = Document::from_bytes(bytes, Configuration::default()).unwrap();

    assert_eq!(reread.page_count().unwrap(), 4);
    assert_eq!(page_contents(&mut reread), original);
    assert!(reread.catalog().unwrap().is_type(b"Catalog"));

    // And the rewrite of the rewrite parses too.
    let again = writer::write_full(&mut reread, "roundtrip2.pdf", &CancelFlag::new()).unwrap();
    assert!(Document::from_bytes(again, Configuration::default()).is_ok());
}

// Boundary: a document whose catalog has no Pages is rejected.
#[test]
fn zero_page_document_rejected() {
    let bodies = vec![b"1 0 obj\n<< /Type /Catalog >>\nendobj\n".to_vec()];
    let mut doc = Document::from_bytes(assemble(&bodies, ""), Configuration::default()).unwrap();
    assert!(matches!(
        doc.page_count(),
        Err(PdfError::CorruptTrailer(_))
    ));
}

// Boundary: an empty page tree is also rejected.
#[test]
fn empty_page_tree_rejected() {
    let bodies = vec![
        b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec(),
        b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n".to_vec(),
    ];
    let mut doc = Document::from_bytes(assemble(&bodies, ""), Configuration::default()).unwrap();
    assert!(matches!(
        doc.page_count(),
        Err(PdfError::CorruptTrailer(_))
    ));
}

// Boundary: a reference to a free slot dereferences to Null.
#[test]
fn free_reference_is_null() {
    let mut doc = Document::from_bytes(n_page_pdf(1), Configuration::default()).unwrap();
    assert!(doc.get(ObjectId::new(40, 0)).unwrap().is_null());
    assert!(doc.get(ObjectId::new(0, 65535)).unwrap().is_null());
}

// Boundary: stream Length held in an indirect integer.
#[test]
fn indirect_stream_length_resolved() {
    let bodies = vec![
        b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n".to_vec(),
        b"2 0 obj\n<< /Type /Pages /Kids [3 0 R] /Count 1 >>\nendobj\n".to_vec(),
        b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>\nendobj\n"
            .to_vec(),
        b"4 0 obj\n<< /Length 5 0 R >>\nstream\ndeferred body\nendstream\nendobj\n".to_vec(),
        b"5 0 obj\n13\nendobj\n".to_vec(),
    ];
    let mut doc = Document::from_bytes(assemble(&bodies, ""), Configuration::default()).unwrap();

    let object = doc.get(ObjectId::new(4, 0)).unwrap();
    let stream = object.as_stream().unwrap();
    assert_eq!(stream.declared_length(), Some(13));
    assert_eq!(stream.decoded_data(), Some(b"deferred body".as_ref()));
}

// Boundary: odd-length hex strings pad a trailing zero nibble.
#[test]
fn odd_hex_string_pads() {
    let mut parser = pdfcraft::parser::ObjectParser::new(b"<414>");
    let object = parser.parse_object().unwrap();
    assert_eq!(object.as_string(), Some([0x41, 0x40].as_ref()));
}

// Invariant 4: the free list stays a cycle through 0 after mutations.
#[test]
fn free_list_cycle_after_mutations() {
    let mut doc = Document::from_bytes(n_page_pdf(3), Configuration::default()).unwrap();
    let selection: BTreeSet<u32> = [2, 3].into_iter().collect();
    remove_pages(&mut doc, &selection).unwrap();
    doc.xref_mut().ensure_valid_free_list();

    let chain = doc.xref().free_chain();
    assert_eq!(chain[0], 0);
    let frees = doc
        .xref()
        .iter()
        .filter(|(_, e)| e.is_free())
        .count();
    assert_eq!(chain.len(), frees);
    assert_eq!(doc.xref().size(), 9);
}

// Invariant 5 at the file level: candidate order does not change the mode.
#[test]
fn password_order_insensitive() {
    let mut doc = Document::from_bytes(n_page_pdf(1), Configuration::default()).unwrap();
    doc.enable_encryption(b"u", b"o", pdfcraft::encryption::Permissions::all_granted())
        .unwrap();
    let bytes = writer::write_full(&mut doc, "enc.pdf", &CancelFlag::new()).unwrap();

    let a = Document::from_bytes(
        bytes.clone(),
        Configuration::default().with_passwords(b"u", b"o"),
    )
    .unwrap();
    let b = Document::from_bytes(
        bytes,
        Configuration::default().with_passwords(b"o", b"u"),
    )
    .unwrap();
    assert_eq!(
        a.encryption().unwrap().auth_mode(),
        b.encryption().unwrap().auth_mode()
    );
    assert_eq!(a.encryption().unwrap().auth_mode(), AuthMode::Owner);
}

// Encrypted write round-trip: streams and strings survive re-reading.
#[test]
fn encrypted_rewrite_roundtrip() {
    let mut doc = Document::from_bytes(n_page_pdf(2), Configuration::default()).unwrap();
    let original = page_contents(&mut doc);
    doc.enable_encryption(b"user", b"owner", pdfcraft::encryption::Permissions::all_granted())
        .unwrap();

    let bytes = writer::write_full(&mut doc, "enc.pdf", &CancelFlag::new()).unwrap();

    assert!(matches!(
        Document::from_bytes(bytes.clone(), Configuration::default()),
        Err(PdfError::PasswordRequired)
    ));

    let mut reread = Document::from_bytes(
        bytes,
        Configuration::default().with_passwords(b"user", b""),
    )
    .unwrap();
    assert_eq!(reread.page_count().unwrap(), 2);
    assert_eq!(page_contents(&mut reread), original);
}
