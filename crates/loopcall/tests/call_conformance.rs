//! Conformance tests for the two dispatch paths.
//!
//! The direct path and the pipe path must be observably identical: same
//! replies, same error kinds, same handler behavior. These tests register
//! the same services and run the same scenarios through both.

use std::collections::HashMap;
use std::sync::Arc;

use loopcall::{
    encode_frame, CallError, Caller, Context, Dispatcher, HandlerError, LoopbackChannel,
    PendingCall, PipeClient, PipeServer, PostcardCodec, ServiceBuilder, TransportError,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct Echo;

struct Store;

fn test_caller() -> Caller {
    let caller: Caller = Caller::new();
    caller.register(
        "Echo",
        ServiceBuilder::new(Echo)
            .method(
                "Upper",
                |_h: &Echo, _cx: Context, s: String, reply: &mut String| {
                    *reply = s.to_uppercase();
                    Ok(())
                },
            )
            .method(
                "Fail",
                |_h: &Echo, _cx: Context, _s: String, _reply: &mut String| {
                    Err(HandlerError::new("echo is broken today"))
                },
            )
            .method(
                "Sleepy",
                |_h: &Echo, cx: Context, s: String, reply: &mut String| {
                    if cx.is_cancelled() {
                        return Err(HandlerError::new("cancelled"));
                    }
                    *reply = s;
                    Ok(())
                },
            ),
    );
    caller.register(
        "Store",
        ServiceBuilder::new(Store).method(
            "Index",
            |_h: &Store, _cx: Context, words: Vec<String>, reply: &mut HashMap<String, usize>| {
                for (pos, word) in words.into_iter().enumerate() {
                    reply.insert(word, pos);
                }
                Ok(())
            },
        ),
    );
    caller
}

#[test]
fn direct_echo_upper() {
    init_tracing();
    let caller = test_caller();
    let out: String = caller.call(Context::new(), "Echo.Upper", "hi").unwrap();
    assert_eq!(out, "HI");
}

#[tokio::test]
async fn pipe_echo_upper() {
    init_tracing();
    let caller = test_caller();
    let pipe = caller.pipe();
    let out: String = pipe.call("Echo.Upper", "hi").await.unwrap();
    assert_eq!(out, "HI");
    pipe.close();
}

#[tokio::test]
async fn pipe_and_direct_agree() {
    init_tracing();
    let caller = test_caller();
    let pipe = caller.pipe();

    let direct: String = caller.call(Context::new(), "Echo.Upper", "same").unwrap();
    let piped: String = pipe.call("Echo.Upper", "same").await.unwrap();
    assert_eq!(direct, piped);

    let direct_err = caller
        .call::<str, String>(Context::new(), "Echo.Fail", "x")
        .unwrap_err();
    let piped_err = pipe.call::<str, String>("Echo.Fail", "x").await.unwrap_err();
    assert_eq!(direct_err, piped_err);
    assert_eq!(piped_err, CallError::Handler("echo is broken today".to_string()));

    pipe.close();
}

#[tokio::test]
async fn pipe_preserves_error_kinds() {
    init_tracing();
    let caller = test_caller();
    let pipe = caller.pipe();

    let err = pipe.call::<str, String>("NoDotHere", "x").await.unwrap_err();
    assert_eq!(err, CallError::MalformedKey("NoDotHere".to_string()));

    let err = pipe.call::<str, String>("Ghost.Upper", "x").await.unwrap_err();
    assert_eq!(err, CallError::ServiceNotFound("Ghost".to_string()));

    let err = pipe.call::<str, String>("Echo.Lower", "x").await.unwrap_err();
    assert_eq!(err, CallError::MethodNotFound("Echo.Lower".to_string()));

    let err = pipe
        .call::<Vec<u32>, String>("Echo.Upper", &vec![1, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, CallError::Decode(_)));

    pipe.close();
}

#[tokio::test]
async fn pipe_sequential_calls_reuse_the_channel() {
    init_tracing();
    let caller = test_caller();
    let pipe = caller.pipe();

    for word in ["one", "two", "three"] {
        let out: String = pipe.call("Echo.Upper", word).await.unwrap();
        assert_eq!(out, word.to_uppercase());
    }
    pipe.close();
}

#[tokio::test]
async fn pipe_map_reply_is_preinitialized() {
    init_tracing();
    let caller = test_caller();
    let pipe = caller.pipe();

    let words = vec!["alpha".to_string(), "beta".to_string()];
    let index: HashMap<String, usize> = pipe.call("Store.Index", &words).await.unwrap();
    assert_eq!(index["alpha"], 0);
    assert_eq!(index["beta"], 1);

    let empty: HashMap<String, usize> = pipe
        .call("Store.Index", &Vec::<String>::new())
        .await
        .unwrap();
    assert!(empty.is_empty());

    pipe.close();
}

#[tokio::test]
async fn pipe_go_completes_exactly_once() {
    init_tracing();
    let caller = test_caller();
    let pipe = caller.pipe();

    let pending: Vec<PendingCall<String>> = (0..8)
        .map(|i| pipe.go("Echo.Upper", &format!("go-{i}")))
        .collect();

    for (i, call) in pending.into_iter().enumerate() {
        assert_eq!(call.wait().await.unwrap(), format!("GO-{i}"));
    }
    pipe.close();
}

#[tokio::test]
async fn pipe_with_postcard_codec() {
    init_tracing();
    let caller: Caller<PostcardCodec> = Caller::new();
    caller.register(
        "Echo",
        ServiceBuilder::new(Echo).method(
            "Upper",
            |_h: &Echo, _cx: Context, s: String, reply: &mut String| {
                *reply = s.to_uppercase();
                Ok(())
            },
        ),
    );

    let direct: String = caller.call(Context::new(), "Echo.Upper", "binary").unwrap();
    assert_eq!(direct, "BINARY");

    let pipe = caller.pipe();
    let piped: String = pipe.call("Echo.Upper", "binary").await.unwrap();
    assert_eq!(piped, "BINARY");
    pipe.close();
}

#[tokio::test]
async fn pipe_refuses_oversized_request() {
    init_tracing();
    let caller = test_caller();
    let pipe = caller.pipe();

    // Too big to frame once JSON-encoded; refused before anything is written.
    let big = "x".repeat(17 * 1024 * 1024);
    let err = pipe
        .call::<str, String>("Echo.Upper", big.as_str())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CallError::Transport(TransportError::FrameTooLarge(_))
    ));

    // The channel survives the refused request.
    let out: String = pipe.call("Echo.Upper", "still here").await.unwrap();
    assert_eq!(out, "STILL HERE");
    pipe.close();
}

#[tokio::test]
async fn server_failure_closes_the_channel() {
    init_tracing();
    let caller = test_caller();
    let (client_end, server_end) = LoopbackChannel::pair();
    let server = PipeServer::new(Dispatcher::new(Arc::clone(caller.registry())), server_end);
    tokio::spawn(async move {
        let _ = server.serve(Context::new()).await;
    });

    // A length prefix above the frame cap kills the serving loop; the client
    // must see the close rather than wait forever.
    let raw = client_end.clone();
    raw.write(&u32::MAX.to_le_bytes()).unwrap();
    raw.signal();

    let pipe: PipeClient = PipeClient::new(client_end);
    let err = pipe.call::<str, String>("Echo.Upper", "hi").await.unwrap_err();
    assert_eq!(err, CallError::Transport(TransportError::Closed));
}

#[tokio::test]
async fn undecodable_request_shuts_the_pipe_down() {
    init_tracing();
    let caller = test_caller();
    let (client_end, server_end) = LoopbackChannel::pair();
    let server = PipeServer::new(Dispatcher::new(Arc::clone(caller.registry())), server_end);
    tokio::spawn(async move {
        let _ = server.serve(Context::new()).await;
    });

    // A well-framed body that is not a request frame.
    let raw = client_end.clone();
    raw.write(&encode_frame(b"not a frame").unwrap()).unwrap();
    raw.signal();

    let pipe: PipeClient = PipeClient::new(client_end);
    let err = pipe.call::<str, String>("Echo.Upper", "hi").await.unwrap_err();
    assert_eq!(err, CallError::Transport(TransportError::Closed));
}

#[tokio::test]
async fn pipe_connection_context_reaches_handlers() {
    init_tracing();
    let caller = test_caller();

    let cx = Context::new();
    let pipe = caller.pipe_with_context(cx.clone());

    let out: String = pipe.call("Echo.Sleepy", "awake").await.unwrap();
    assert_eq!(out, "awake");

    cx.cancel();
    let err = pipe.call::<str, String>("Echo.Sleepy", "awake").await.unwrap_err();
    assert_eq!(err, CallError::Handler("cancelled".to_string()));

    pipe.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_go_against_one_service() {
    init_tracing();
    let caller = test_caller();

    let pending: Vec<PendingCall<String>> = (0..64)
        .map(|i| caller.go(Context::new(), "Echo.Upper", &format!("n{i}")))
        .collect();

    let mut completions = 0;
    for (i, call) in pending.into_iter().enumerate() {
        assert_eq!(call.wait().await.unwrap(), format!("N{i}"));
        completions += 1;
    }
    assert_eq!(completions, 64);
}

#[test]
fn registered_handler_is_retrievable() {
    init_tracing();
    let caller = test_caller();
    assert!(caller.registry().get_handler::<Echo>("Echo").is_some());
    assert!(caller.registry().get_handler::<Store>("Echo").is_none());
}
