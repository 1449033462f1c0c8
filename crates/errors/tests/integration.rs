//! Integration tests for error types

use sprig_errors::*;

#[test]
fn resolve_error_converts_into_top_level() {
    let err: Error = ResolveError::UnknownPackage {
        name: "zlib".into(),
    }
    .into();
    assert!(err.is_resolver_failure());
    assert_eq!(err.user_code(), Some("resolve.unknown_package"));
}

#[test]
fn unsatisfiable_lists_every_conflict() {
    let err = ResolveError::UnsatisfiableConstraints {
        conflicts: vec![
            ConflictRecord {
                package: "libfoo".into(),
                reason: "@=1.4 vs @=2.0".into(),
                origins: vec!["app".into(), "libbar".into()],
            },
            ConflictRecord {
                package: "zlib".into(),
                reason: "+shared vs ~shared".into(),
                origins: vec![],
            },
        ],
    };
    let text = err.to_string();
    assert!(text.contains("libfoo: @=1.4 vs @=2.0 (required by app, libbar)"));
    assert!(text.contains("zlib: +shared vs ~shared"));
}

#[test]
fn cycle_renders_as_path() {
    let err = ResolveError::CyclicDependency {
        cycle: vec!["x".into(), "y".into(), "x".into()],
    };
    assert_eq!(err.to_string(), "cyclic dependency: x -> y -> x");
}

#[test]
fn lock_timeout_is_retryable() {
    let err: Error = StoreError::LockTimeout {
        hash: "abc".into(),
    }
    .into();
    assert!(err.is_retryable());
    assert_eq!(err.user_code(), Some("store.lock_timeout"));
}

#[test]
fn io_error_conversion_keeps_kind() {
    let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: Error = io_err.into();
    assert!(matches!(
        err,
        Error::Io {
            kind: std::io::ErrorKind::PermissionDenied,
            ..
        }
    ));
}

#[test]
fn error_clone_preserves_message() {
    let err = SpecError::NotConcrete {
        spec: "zlib@1.2:".into(),
    };
    let cloned = err.clone();
    assert_eq!(err.to_string(), cloned.to_string());
}
