// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    canceled            = { Code::Canceled, 499 },
    invalid_argument    = { Code::InvalidArgument, 400 },
    not_found           = { Code::NotFound, 404 },
    already_exists      = { Code::AlreadyExists, 409 },
    permission_denied   = { Code::PermissionDenied, 403 },
    failed_precondition = { Code::FailedPrecondition, 412 },
    aborted             = { Code::Aborted, 409 },
    out_of_range        = { Code::OutOfRange, 400 },
    unimplemented       = { Code::Unimplemented, 501 },
    internal            = { Code::Internal, 500 },
    unavailable         = { Code::Unavailable, 503 },
    data_loss           = { Code::DataLoss, 500 },
    unauthenticated     = { Code::Unauthenticated, 401 },
    resource_exhausted  = { Code::ResourceExhausted, 429 },
    deadline_exceeded   = { Code::DeadlineExceeded, 504 },
    unknown             = { Code::Unknown, 500 },
)]
fn codes_map_to_http_status(code: Code, status: u16) {
    assert_eq!(code.http_status(), status);
}

#[test]
fn code_serde_uses_snake_case() {
    let json = serde_json::to_string(&Code::FailedPrecondition).unwrap();
    assert_eq!(json, "\"failed_precondition\"");
    let parsed: Code = serde_json::from_str("\"not_found\"").unwrap();
    assert_eq!(parsed, Code::NotFound);
}

#[test]
fn display_includes_code_and_message() {
    let err = Error::not_found("task task-xyz not found");
    assert_eq!(err.to_string(), "not_found: task task-xyz not found");
}

#[test]
fn cause_is_preserved_as_source() {
    use std::error::Error as _;
    let io = std::io::Error::other("disk on fire");
    let err = Error::internal("write failed").with_cause(io);
    assert!(err.source().is_some());
    assert_eq!(err.code(), Code::Internal);
}

#[test]
fn io_not_found_maps_to_not_found() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: Error = io.into();
    assert_eq!(err.code(), Code::NotFound);
}

#[test]
fn io_other_maps_to_internal() {
    let io = std::io::Error::other("nope");
    let err: Error = io.into();
    assert_eq!(err.code(), Code::Internal);
}
