//! ツアー予約管理
//!
//! 定員付きグループツアーの予約を扱う。座席の確保、人数に応じた価格決定、
//! 予約の状態遷移（仮押さえ・確定・キャンセル・催行済み）を提供する。

pub mod adapter;
pub mod application;
pub mod domain;
