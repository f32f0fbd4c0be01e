//! The deframing law: however the byte stream is split, the decoded
//! message sequence is the original one.

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use transport::{DapReader, Message};

fn frame(json: &str) -> Vec<u8> {
    format!("Content-Length: {}\r\n\r\n{}", json.len(), json).into_bytes()
}

fn two_frames() -> Vec<u8> {
    let mut bytes = frame(r#"{"type":"event","event":"initialized","seq":1}"#);
    bytes.extend(frame(
        r#"{"type":"response","request_seq":1,"success":true,"command":"initialize","seq":2,"body":{"supportsConfigurationDoneRequest":true}}"#,
    ));
    bytes
}

async fn decode_all(reader: &mut DapReader<tokio::io::DuplexStream>) -> Vec<Message> {
    let mut out = Vec::new();
    while let Some(msg) = reader.next().await {
        out.push(msg.expect("decode"));
    }
    out
}

fn assert_expected_sequence(messages: &[Message]) {
    assert_eq!(messages.len(), 2, "got {messages:?}");
    assert!(matches!(&messages[0], Message::Event(e) if e.event == "initialized"));
    let Message::Response(response) = &messages[1] else {
        panic!("expected a response, got {:?}", messages[1]);
    };
    assert_eq!(response.request_seq, 1);
    assert!(response.success);
    assert_eq!(
        response.body.as_ref().unwrap()["supportsConfigurationDoneRequest"],
        true
    );
}

#[tokio::test]
async fn one_byte_chunks_deframe_cleanly() {
    let (mut tx, rx) = tokio::io::duplex(64);
    let mut reader = DapReader::new(rx);

    let writer = tokio::spawn(async move {
        for byte in two_frames() {
            tx.write_all(&[byte]).await.unwrap();
            tx.flush().await.unwrap();
        }
        // tx drops here, ending the stream.
    });

    let messages = decode_all(&mut reader).await;
    writer.await.unwrap();
    assert_expected_sequence(&messages);
}

#[tokio::test]
async fn coalesced_frames_deframe_cleanly() {
    let (mut tx, rx) = tokio::io::duplex(64 * 1024);
    let mut reader = DapReader::new(rx);

    let writer = tokio::spawn(async move {
        tx.write_all(&two_frames()).await.unwrap();
        tx.flush().await.unwrap();
    });

    let messages = decode_all(&mut reader).await;
    writer.await.unwrap();
    assert_expected_sequence(&messages);
}

#[tokio::test]
async fn split_mid_header_and_mid_body_deframes_cleanly() {
    let bytes = two_frames();

    // Try a spread of split points, including inside the header of the
    // first frame and inside the body of the second.
    for split in [5, 20, 30, bytes.len() / 2, bytes.len() - 3] {
        let (mut tx, rx) = tokio::io::duplex(64 * 1024);
        let mut reader = DapReader::new(rx);

        let (head, tail) = (bytes[..split].to_vec(), bytes[split..].to_vec());
        let writer = tokio::spawn(async move {
            tx.write_all(&head).await.unwrap();
            tx.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            tx.write_all(&tail).await.unwrap();
            tx.flush().await.unwrap();
        });

        let messages = decode_all(&mut reader).await;
        writer.await.unwrap();
        assert_expected_sequence(&messages);
    }
}
