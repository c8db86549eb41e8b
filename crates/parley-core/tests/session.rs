mod common;

use std::sync::atomic::Ordering;

use std::path::Path;

use parley_core::parley_abi::{
    Backend, ChatTurn, ContextParameters, EngineError, ModelParameters, Role, SamplingParameters,
};
use parley_core::{ChatTemplate, ConversationSession, SessionConfig, SessionError, TemplateKind};
use parley_scripted::{
    ResourceEvent, ScriptedBackend, ScriptedContext, ScriptedModel, ScriptedVocab,
};

use common::{context_params, init_tracing, model_path};

fn ready(backend: ScriptedBackend, n_ctx: usize) -> anyhow::Result<ConversationSession<ScriptedBackend>> {
    let mut s = ConversationSession::new(backend);
    s.initialize_model(model_path(), &ModelParameters::default())?;
    s.initialize_context(&context_params(n_ctx, 64))?;
    Ok(s)
}

fn terse(max_tokens: usize) -> SamplingParameters {
    SamplingParameters {
        temperature: 0.0,
        seed: Some(42),
        ..SamplingParameters::greedy(max_tokens)
    }
}

#[test]
fn terse_reply_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let mut s = ready(ScriptedBackend::new().with_replies(["4<|eot_id|>"]), 512)?;
    s.set_system_prompt("You are terse.");

    let mut fragments = Vec::new();
    let reply = s.submit("2+2?", &terse(5), |f| fragments.push(f.to_string()))?;

    assert_eq!(reply, "4");
    assert!(fragments.iter().all(|f| !f.contains("<|")));
    assert_eq!(
        s.messages(),
        &[
            ChatTurn::system("You are terse."),
            ChatTurn::user("2+2?"),
            ChatTurn::assistant("4"),
        ]
    );
    Ok(())
}

#[test]
fn same_seed_same_reply() -> anyhow::Result<()> {
    let params = SamplingParameters {
        seed: Some(7),
        ..SamplingParameters::default()
    };
    let mut replies = Vec::new();
    for _ in 0..2 {
        let mut s = ready(ScriptedBackend::new().with_replies(["four"]), 512)?;
        replies.push(s.submit("2+2?", &params, |_| {})?);
    }
    assert_eq!(replies[0], replies[1]);
    Ok(())
}

#[test]
fn control_tokens_inside_a_reply_are_filtered() -> anyhow::Result<()> {
    let mut s = ready(
        ScriptedBackend::new().with_replies(["ok<|start_header_id|>!<|eot_id|>"]),
        512,
    )?;
    let mut streamed = String::new();
    let reply = s.submit("hi", &terse(20), |f| streamed.push_str(f))?;
    assert_eq!(reply, "ok!");
    assert_eq!(streamed, "ok!");
    Ok(())
}

#[test]
fn history_grows_turn_by_turn() -> anyhow::Result<()> {
    let mut s = ready(
        ScriptedBackend::new().with_replies(["one<|eot_id|>", "two<|eot_id|>"]),
        512,
    )?;
    assert_eq!(s.submit("a", &terse(10), |_| {})?, "one");
    assert_eq!(s.submit("b", &terse(10), |_| {})?, "two");
    let roles: Vec<Role> = s.messages().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::User, Role::Assistant]
    );

    s.reset_conversation();
    assert!(s.messages().is_empty());
    Ok(())
}

#[test]
fn engine_failure_keeps_only_the_user_turn() -> anyhow::Result<()> {
    let backend = ScriptedBackend::new().with_replies(["abc"]);
    let script = backend.script();
    let mut s = ready(backend, 512)?;
    s.set_system_prompt("sys");
    script.fail_decode_at(1);

    let mut fragments = Vec::new();
    let err = s
        .submit("hello", &terse(10), |f| fragments.push(f.to_string()))
        .unwrap_err();

    assert!(matches!(err, SessionError::Engine(EngineError::Decode(_))));
    assert_eq!(
        s.messages(),
        &[ChatTurn::system("sys"), ChatTurn::user("hello")]
    );
    assert_eq!(fragments, vec!["a".to_string()]);
    // the session stays usable
    assert!(s.is_ready());
    Ok(())
}

#[test]
fn overflow_is_an_error_and_records_no_reply() -> anyhow::Result<()> {
    let mut s = ready(ScriptedBackend::new().with_replies(["abcdefghij"]), 24)?;
    let err = s.submit("hi", &terse(100), |_| {}).unwrap_err();
    assert_eq!(
        err,
        SessionError::Overflow {
            position: 24,
            capacity: 24
        }
    );
    assert_eq!(s.messages(), &[ChatTurn::user("hi")]);
    Ok(())
}

#[test]
fn rejected_calls_leave_history_alone() -> anyhow::Result<()> {
    let mut cold = ConversationSession::new(ScriptedBackend::new());
    assert!(matches!(
        cold.submit("hi", &terse(1), |_| {}),
        Err(SessionError::Configuration(_))
    ));
    assert!(cold.messages().is_empty());

    let mut s = ready(ScriptedBackend::new(), 512)?;
    let bad = SamplingParameters {
        top_p: 2.0,
        ..terse(1)
    };
    assert!(matches!(
        s.submit("hi", &bad, |_| {}),
        Err(SessionError::Configuration(_))
    ));
    assert!(s.messages().is_empty());
    Ok(())
}

#[test]
fn stop_handle_cancels_mid_reply() -> anyhow::Result<()> {
    let mut s = ready(ScriptedBackend::new().with_replies(["abcdef"]), 512)?;
    let stop = s.stop_handle();
    // left over from an earlier call; cleared on entry
    stop.store(true, Ordering::Relaxed);

    let reply = s.submit("go", &terse(10), |_| stop.store(true, Ordering::Relaxed))?;
    assert_eq!(reply, "a");
    assert_eq!(s.messages().last(), Some(&ChatTurn::assistant("a")));
    Ok(())
}

#[test]
fn encode_decode_round_trip() -> anyhow::Result<()> {
    let mut s = ConversationSession::new(ScriptedBackend::new());
    s.initialize_model(model_path(), &ModelParameters::default())?;

    // usable before the context exists
    let tokens = s.encode("Hello, world!", false)?;
    assert_eq!(tokens.len(), "Hello, world!".len());

    let mut joined = String::new();
    for &t in &tokens {
        joined.push_str(&s.decode(&[t])?);
    }
    assert_eq!(joined, "Hello, world!");
    assert_eq!(s.decode(&tokens)?, "Hello, world!");

    let with_bos = s.encode("Hi", true)?;
    assert_eq!(with_bos.len(), 3);
    // markup in user text stays bytes
    assert_eq!(s.encode("<|eot_id|>", false)?.len(), 10);
    Ok(())
}

#[test]
fn resources_are_released_in_reverse_order() -> anyhow::Result<()> {
    let backend = ScriptedBackend::new();
    let ledger = backend.ledger();
    {
        let mut s = ready(backend, 128)?;
        assert_eq!(ledger.live(), 2);

        s.initialize_context(&context_params(256, 32))?;
        assert_eq!(ledger.live(), 2);
    }
    assert_eq!(
        ledger.events(),
        vec![
            ResourceEvent::ModelLoaded(1),
            ResourceEvent::ContextCreated(2),
            ResourceEvent::ContextReleased(2),
            ResourceEvent::ContextCreated(3),
            ResourceEvent::ContextReleased(3),
            ResourceEvent::ModelReleased(1),
        ]
    );
    assert_eq!(ledger.live(), 0);
    Ok(())
}

#[test]
fn reloading_the_model_tears_down_the_old_engine_first() -> anyhow::Result<()> {
    let backend = ScriptedBackend::new();
    let ledger = backend.ledger();
    let mut s = ready(backend, 128)?;
    s.initialize_model(model_path(), &ModelParameters::default())?;
    assert!(!s.is_ready());
    assert_eq!(
        ledger.events(),
        vec![
            ResourceEvent::ModelLoaded(1),
            ResourceEvent::ContextCreated(2),
            ResourceEvent::ContextReleased(2),
            ResourceEvent::ModelReleased(1),
            ResourceEvent::ModelLoaded(3),
        ]
    );
    Ok(())
}

#[test]
fn initialization_failures_leave_nothing_usable() {
    let mut s = ConversationSession::new(ScriptedBackend::new());
    assert!(matches!(
        s.initialize_model("/definitely/not/here.gguf", &ModelParameters::default()),
        Err(SessionError::Configuration(_))
    ));
    assert!(matches!(
        s.initialize_context(&context_params(128, 32)),
        Err(SessionError::Configuration(_))
    ));
    assert!(s.encode("x", false).is_err());

    let backend = ScriptedBackend::new().failing_model_load();
    let ledger = backend.ledger();
    let mut s = ConversationSession::new(backend);
    assert!(matches!(
        s.initialize_model(model_path(), &ModelParameters::default()),
        Err(SessionError::Engine(EngineError::ModelLoad(_)))
    ));
    assert!(!s.is_ready());
    assert!(ledger.events().is_empty());
}

/// Resolves model names from a registry instead of the filesystem.
struct Registry {
    inner: ScriptedBackend,
    known: &'static str,
}

impl Backend for Registry {
    type Model = ScriptedModel;
    type Context = ScriptedContext;

    fn load_model(
        &mut self,
        path: &Path,
        params: &ModelParameters,
    ) -> Result<ScriptedModel, EngineError> {
        if path != Path::new(self.known) {
            return Err(EngineError::ModelNotFound(path.display().to_string()));
        }
        self.inner.load_model(&common::model_path(), params)
    }

    fn new_context(
        &mut self,
        model: &ScriptedModel,
        params: &ContextParameters,
    ) -> Result<ScriptedContext, EngineError> {
        self.inner.new_context(model, params)
    }
}

#[test]
fn model_identifiers_are_resolved_by_the_backend() -> anyhow::Result<()> {
    let mut s = ConversationSession::new(Registry {
        inner: ScriptedBackend::new().with_replies(["ok"]),
        known: "registry:tiny-chat",
    });
    s.initialize_model("registry:tiny-chat", &ModelParameters::default())?;
    s.initialize_context(&context_params(128, 32))?;
    assert_eq!(s.submit("hi", &terse(4), |_| {})?, "ok");

    assert!(matches!(
        s.initialize_model("registry:unknown", &ModelParameters::default()),
        Err(SessionError::Configuration(_))
    ));
    assert!(!s.is_ready());
    Ok(())
}

#[test]
fn context_failure_falls_back_to_model_loaded() -> anyhow::Result<()> {
    let backend = ScriptedBackend::new().failing_context_init();
    let ledger = backend.ledger();
    let mut s = ConversationSession::new(backend);
    s.initialize_model(model_path(), &ModelParameters::default())?;

    assert!(matches!(
        s.initialize_context(&context_params(128, 32)),
        Err(SessionError::Engine(EngineError::ContextInit(_)))
    ));
    assert!(!s.is_ready());
    assert_eq!(ledger.live(), 1);
    assert_eq!(s.encode("ok", false)?.len(), 2);
    Ok(())
}

#[test]
fn unresolvable_end_of_turn_marker_is_rejected() -> anyhow::Result<()> {
    let vocab = ScriptedVocab::new(["<s>", "</s>"], "<s>", "</s>")
        .ok_or_else(|| anyhow::anyhow!("bad vocab"))?;
    let backend = ScriptedBackend::with_vocab(vocab);
    let ledger = backend.ledger();
    let mut s = ConversationSession::new(backend);
    s.initialize_model(model_path(), &ModelParameters::default())?;

    assert!(matches!(
        s.initialize_context(&context_params(128, 32)),
        Err(SessionError::Configuration(_))
    ));
    assert!(!s.is_ready());
    assert_eq!(ledger.live(), 1);
    assert!(s.set_template(TemplateKind::ChatMl).is_err());
    Ok(())
}

#[test]
fn chatml_sessions_stop_on_im_end() -> anyhow::Result<()> {
    let mut s = ConversationSession::with_template(
        ScriptedBackend::new().with_replies(["hi there<|im_end|>"]),
        TemplateKind::ChatMl,
    );
    s.initialize_model(model_path(), &ModelParameters::default())?;
    s.initialize_context(&context_params(512, 64))?;
    assert_eq!(s.template().name(), "chatml");
    assert_eq!(s.submit("hello", &terse(20), |_| {})?, "hi there");

    s.set_template(TemplateKind::Llama3)?;
    assert_eq!(s.template().name(), "llama3");
    Ok(())
}

#[test]
fn open_from_config() -> anyhow::Result<()> {
    let json = format!(
        r#"{{
            "model_path": {path:?},
            "context": {{ "context_size": 256, "batch_size": 16 }},
            "sampling": {{ "max_tokens": 8, "temperature": 0.0, "seed": 3 }},
            "system_prompt": "You are terse."
        }}"#,
        path = model_path().display().to_string()
    );
    let mut cfg = SessionConfig::from_json_str(&json)?;
    cfg.apply_overrides_from(|k| (k == "PARLEY_MAX_DECODE_TOKENS").then(|| "2".into()))?;
    assert_eq!(cfg.sampling.max_tokens, 2);

    let mut s = ConversationSession::open(ScriptedBackend::new().with_replies(["abc"]), &cfg)?;
    assert!(s.is_ready());
    assert_eq!(s.messages(), &[ChatTurn::system("You are terse.")]);
    assert_eq!(s.submit("go", &cfg.sampling, |_| {})?, "ab");
    Ok(())
}
