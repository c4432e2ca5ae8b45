//! Template engine
//!
//! Owns context construction, type mapping, import synthesis and output
//! formatting, and renders templates through a sandboxed handlebars
//! instance. Rendering is a pure function of `(template, context)`:
//! templates see only the bindings built here - no filesystem, clock or
//! environment - so independent renders run in parallel without shared
//! mutable state.

mod context;
mod format;
mod typemap;

pub use context::generate_context;
pub use format::format_output;
pub use typemap::{MapFn, TypeMap};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use handlebars::Handlebars;
use rayon::prelude::*;
use serde_json::Value;

use crate::error::TemplateError;
use crate::model::{pluralize, to_pascal_case, to_snake_case, DomainConfig, EntityConfig};
use crate::registry::Template;

/// Default per-render wall-clock budget
const DEFAULT_RENDER_BUDGET: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag shared between a run and its workers
///
/// Workers check it between renders; nothing is promoted until all
/// renders succeed, so cancellation can never corrupt an output tree.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    inner: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// One render work item
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub template: Template,
    pub context: Value,
    pub output_path: PathBuf,
    /// Entity this file is scoped to; `None` for cross-cutting files
    pub entity: Option<String>,
}

/// One rendered, formatted output file
#[derive(Debug, Clone)]
pub struct RenderedFile {
    pub path: PathBuf,
    pub text: String,
    pub template: String,
    pub entity: Option<String>,
}

/// Failure mode of a render batch
#[derive(Debug)]
pub enum RenderBatchError {
    /// The cancellation flag was raised before the batch finished
    Cancelled,
    Failed(TemplateError),
}

/// Handlebars-backed template engine
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    type_map: TypeMap,
    render_budget: Duration,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::with_type_map(TypeMap::default())
    }

    pub fn with_type_map(type_map: TypeMap) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_helper("snake_case", Box::new(snake_case_helper));
        handlebars.register_helper("pascal_case", Box::new(pascal_case_helper));
        handlebars.register_helper("camel_case", Box::new(camel_case_helper));
        handlebars.register_helper("plural", Box::new(plural_helper));
        handlebars.register_helper("uppercase", Box::new(uppercase_helper));
        handlebars.register_helper("json", Box::new(json_helper));

        Self {
            handlebars,
            type_map,
            render_budget: DEFAULT_RENDER_BUDGET,
        }
    }

    pub fn set_render_budget(&mut self, budget: Duration) {
        self.render_budget = budget;
    }

    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Compile and cache a template ahead of rendering
    ///
    /// Callers prepare every template up front, then render batches
    /// against `&self` from worker threads.
    pub fn prepare(&mut self, template: &Template) -> Result<(), TemplateError> {
        self.handlebars
            .register_template_string(&template.cache_key(), &*template.source)
            .map_err(|e| TemplateError::Syntax {
                path: template.source_path.clone(),
                message: e.to_string(),
            })
    }

    /// Build the bindings for one output file (see [`generate_context`])
    pub fn build_context(
        &self,
        domain: &DomainConfig,
        entity: Option<&EntityConfig>,
        output_kind: &str,
    ) -> Result<Value, TemplateError> {
        generate_context(domain, entity, output_kind, &self.type_map)
    }

    /// Render one template against a context, returning formatted text
    pub fn render(&self, template: &Template, context: &Value) -> Result<String, TemplateError> {
        let started = Instant::now();
        let key = template.cache_key();

        let rendered = if self.handlebars.has_template(&key) {
            self.handlebars.render(&key, context)
        } else {
            self.handlebars.render_template(&template.source, context)
        };
        let text = rendered.map_err(|e| TemplateError::Render {
            name: template.name.clone(),
            path: template.source_path.clone(),
            message: e.to_string(),
        })?;

        // Renders cannot be preempted mid-expansion; the budget is
        // enforced as soon as the render returns.
        if started.elapsed() > self.render_budget {
            return Err(TemplateError::Timeout {
                name: template.name.clone(),
                budget_ms: self.render_budget.as_millis() as u64,
            });
        }

        Ok(format_output(&text))
    }

    /// Render independent jobs on the rayon worker pool
    ///
    /// Results come back in job order. The first failure aborts the
    /// batch; workers observing the cancellation flag stop picking up
    /// work.
    pub fn batch_render(
        &self,
        jobs: &[RenderJob],
        cancel: &CancellationFlag,
    ) -> Result<Vec<RenderedFile>, RenderBatchError> {
        jobs.par_iter()
            .map(|job| {
                if cancel.is_cancelled() {
                    return Err(RenderBatchError::Cancelled);
                }
                let text = self
                    .render(&job.template, &job.context)
                    .map_err(RenderBatchError::Failed)?;
                Ok(RenderedFile {
                    path: job.output_path.clone(),
                    text,
                    template: job.template.cache_key(),
                    entity: job.entity.clone(),
                })
            })
            .collect()
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// Handlebars helpers

fn helper_param(h: &handlebars::Helper) -> String {
    h.param(0)
        .and_then(|v| v.value().as_str().map(str::to_string))
        .unwrap_or_default()
}

fn snake_case_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    out.write(&to_snake_case(&helper_param(h)))?;
    Ok(())
}

fn pascal_case_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    out.write(&to_pascal_case(&helper_param(h)))?;
    Ok(())
}

fn camel_case_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    let pascal = to_pascal_case(&helper_param(h));
    let mut chars = pascal.chars();
    let camel = match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    };
    out.write(&camel)?;
    Ok(())
}

fn plural_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    out.write(&pluralize(&helper_param(h)))?;
    Ok(())
}

fn uppercase_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    out.write(&helper_param(h).to_uppercase())?;
    Ok(())
}

fn json_helper(
    h: &handlebars::Helper,
    _: &Handlebars,
    _: &handlebars::Context,
    _: &mut handlebars::RenderContext,
    out: &mut dyn handlebars::Output,
) -> handlebars::HelperResult {
    if let Some(v) = h.param(0) {
        out.write(&serde_json::to_string(v.value()).unwrap_or_default())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_str, ConfigFormat};
    use std::path::Path;
    use std::sync::Arc as StdArc;

    fn template(name: &str, kind: &str, source: &str) -> Template {
        Template {
            name: name.to_string(),
            kind: kind.to_string(),
            source_path: PathBuf::from(format!("<test>/{}.{}.hbs", name, kind)),
            priority: 0,
            source: StdArc::from(source),
        }
    }

    fn rental_domain() -> DomainConfig {
        let yaml = r#"
domain:
  name: rentals
  version: "1.0"
entities:
  - name: Property
    fields:
      - name: id
        type: integer
        required: true
      - name: rent
        type: decimal(10,2)
"#;
        parse_str(yaml, ConfigFormat::Yaml, Path::new("test.yaml")).unwrap()
    }

    #[test]
    fn test_render_entity_template() {
        let engine = TemplateEngine::new();
        let domain = rental_domain();
        let ctx = engine
            .build_context(&domain, domain.entity("Property"), "backend-model")
            .unwrap();

        let tpl = template(
            "model",
            "backend-model",
            "class {{entity.name}}:\n{{#each entity.fields}}    {{name}}: {{declaration}}\n{{/each}}",
        );
        let text = engine.render(&tpl, &ctx).unwrap();

        assert!(text.contains("class Property:"));
        assert!(text.contains("id: int"));
        assert!(text.contains("rent: Decimal"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_render_is_deterministic() {
        let engine = TemplateEngine::new();
        let domain = rental_domain();
        let ctx = engine.build_context(&domain, None, "backend-model").unwrap();
        let tpl = template("index", "backend-model", "{{#each entities}}{{name}},{{/each}}");

        assert_eq!(
            engine.render(&tpl, &ctx).unwrap(),
            engine.render(&tpl, &ctx).unwrap()
        );
    }

    #[test]
    fn test_helpers() {
        let engine = TemplateEngine::new();
        let ctx = serde_json::json!({ "name": "PropertyUnit" });

        let cases = [
            ("{{snake_case name}}", "property_unit\n"),
            ("{{pascal_case \"backend-model\"}}", "BackendModel\n"),
            ("{{camel_case name}}", "propertyUnit\n"),
            ("{{plural \"property\"}}", "properties\n"),
            ("{{uppercase name}}", "PROPERTYUNIT\n"),
        ];
        for (source, expected) in cases {
            let tpl = template("t", "k", source);
            assert_eq!(engine.render(&tpl, &ctx).unwrap(), expected, "{source}");
        }
    }

    #[test]
    fn test_prepare_caches_template() {
        let mut engine = TemplateEngine::new();
        let tpl = template("model", "backend-model", "{{entity.name}}");
        engine.prepare(&tpl).unwrap();
        assert!(engine.handlebars.has_template(&tpl.cache_key()));

        let domain = rental_domain();
        let ctx = engine
            .build_context(&domain, domain.entity("Property"), "backend-model")
            .unwrap();
        assert_eq!(engine.render(&tpl, &ctx).unwrap(), "Property\n");
    }

    #[test]
    fn test_prepare_rejects_bad_syntax() {
        let mut engine = TemplateEngine::new();
        let tpl = template("bad", "backend-model", "{{#if x}}unterminated");
        assert!(matches!(
            engine.prepare(&tpl),
            Err(TemplateError::Syntax { .. })
        ));
    }

    #[test]
    fn test_batch_render_preserves_job_order() {
        let engine = TemplateEngine::new();
        let domain = rental_domain();
        let ctx = engine.build_context(&domain, None, "backend-model").unwrap();

        let jobs: Vec<RenderJob> = (0..16)
            .map(|i| RenderJob {
                template: template("t", "k", &format!("file {}", i)),
                context: ctx.clone(),
                output_path: PathBuf::from(format!("out/{}.txt", i)),
                entity: None,
            })
            .collect();

        let rendered = engine.batch_render(&jobs, &CancellationFlag::new()).unwrap();
        assert_eq!(rendered.len(), 16);
        for (i, file) in rendered.iter().enumerate() {
            assert_eq!(file.path, PathBuf::from(format!("out/{}.txt", i)));
            assert_eq!(file.text, format!("file {}\n", i));
        }
    }

    #[test]
    fn test_batch_render_fails_on_bad_job() {
        let engine = TemplateEngine::new();
        let jobs = vec![
            RenderJob {
                template: template("good", "k", "fine"),
                context: serde_json::json!({}),
                output_path: PathBuf::from("a.txt"),
                entity: None,
            },
            RenderJob {
                template: template("bad", "k", "{{#each}}"),
                context: serde_json::json!({}),
                output_path: PathBuf::from("b.txt"),
                entity: None,
            },
        ];

        let err = engine
            .batch_render(&jobs, &CancellationFlag::new())
            .unwrap_err();
        assert!(matches!(err, RenderBatchError::Failed(_)));
    }

    #[test]
    fn test_batch_render_honors_cancellation() {
        let engine = TemplateEngine::new();
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let jobs = vec![RenderJob {
            template: template("t", "k", "text"),
            context: serde_json::json!({}),
            output_path: PathBuf::from("a.txt"),
            entity: None,
        }];

        let err = engine.batch_render(&jobs, &cancel).unwrap_err();
        assert!(matches!(err, RenderBatchError::Cancelled));
    }

    #[test]
    fn test_zero_budget_times_out() {
        let mut engine = TemplateEngine::new();
        engine.set_render_budget(Duration::ZERO);

        let tpl = template("t", "k", "text");
        let err = engine.render(&tpl, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, TemplateError::Timeout { .. }));
    }
}
