//! # paramprompt
//!
//! Parameterized prompt templates for structured (JSON mode) LLM generation.
//!
//! **Note: `paramprompt` is a WIP, so the APIs are subject to change.**
//!
//! ## Usage
//! `paramprompt` is not released on crates.io. To use it, add a dependency in `Cargo.toml`
//! ```toml
//! paramprompt = { git = "https://github.com/ifsheldon/paramprompt.git", branch = "main"}
//! ```
//!
//! ## Concepts and Design
//! Everything starts from a template, so the APIs follow the life of one: define it, bind its inputs, render it, send
//! it, read the reply back. Each step is an explicit value you can inspect.
//!
//! ### Template and Parameter
//!
//! A [Template](crate::prompt::Template) has a unique name, a body and an ordered list of parameters. For example
//!
//! ```text
//! Write a cover letter for this CV: {{cv}}
//! Reply with a JSON object with the key "coverLetter".
//! ```
//!
//! with an Input parameter `cv` and an Output parameter `coverLetter`.
//!
//! `{{cv}}` is a placeholder. Input parameters fill the placeholders of the same name. Output parameters name the keys
//! read back from the JSON reply of the model.
//!
//! ### Store and Binder
//!
//! The [TemplateStore](crate::store::TemplateStore) keeps templates under `template_<name>`. The
//! [ParameterBinder](crate::binder::ParameterBinder) keeps what the user typed for each Input parameter under
//! `__<template>__<param>`, writing after a short quiet period instead of on every keystroke. Both sit on the
//! [Persistence](crate::utils::kv::Persistence) adapter, which any [KeyValueStore](crate::utils::kv::KeyValueStore)
//! can back.
//!
//! ### Filler
//!
//! Anything that fills one or more placeholders in a [PartialPrompt](crate::prompt::PartialPrompt), i.e. anything that
//! implements [`FillPlaceholders`](crate::filler::FillPlaceholders) and [`Fill`](crate::filler::Fill). The binder is
//! one; so is a plain `HashMap<String, String>`.
//!
//! ### Pipeline
//!
//! The [Generator](crate::pipeline::Generator) renders the template with a filler, calls a
//! [Complete](crate::utils::llm::Complete) capability, parses the reply and sanitizes every Output value into display
//! ready HTML. Only the latest request may publish; failures show up as one dismissible error message.
//!
//! [Session](crate::session::Session) ties all of it together the way a front end uses it.
//!
//! ## License
//!
//! `paramprompt` will always remain free under Apache license.
//!
//! ## Attribution
//! * `async_openai`: [crate::utils::llm::openai::OpenAiClient] talks to Groq through this crate.
//! * `ammonia`: [crate::utils::sanitize] uses it to clean model output.


pub mod prompt;
pub mod editor;
pub mod filler;
pub mod store;
pub mod binder;
pub mod pipeline;
pub mod session;
pub mod config;
pub mod utils;
