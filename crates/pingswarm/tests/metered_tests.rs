use pingswarm::engine::metered::MeteredStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn counts_bytes_in_both_directions() {
    let (client, mut server) = tokio::io::duplex(64);
    let mut metered = MeteredStream::new(client);

    metered.write_all(b"ping\n").await.unwrap();
    let mut buf = [0u8; 5];
    server.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping\n");

    server.write_all(b"pong\nextra").await.unwrap();
    let mut reply = [0u8; 5];
    metered.read_exact(&mut reply).await.unwrap();

    assert_eq!(metered.bytes_written(), 5);
    assert_eq!(metered.bytes_read(), 5);
    assert_eq!(&reply, b"pong\n");
}

#[tokio::test]
async fn eof_does_not_change_read_count() {
    let (client, server) = tokio::io::duplex(16);
    drop(server);
    let mut metered = MeteredStream::new(client);

    let mut buf = [0u8; 4];
    let n = metered.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
    assert_eq!(metered.bytes_read(), 0);
}
