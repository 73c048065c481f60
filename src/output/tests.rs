//! Unit tests for output styling

#[cfg(test)]
#[allow(clippy::module_inception)]
mod tests {
    use crate::output::{OutputContext, Styles, progress};
    use owo_colors::OwoColorize;

    #[test]
    fn test_styles_default_has_no_colors() {
        let styles = Styles::default();
        let styled = "test".style(styles.success);
        assert_eq!(format!("{styled}"), "test");
    }

    #[test]
    fn test_styles_colorize_applies_colors() {
        let mut styles = Styles::default();
        styles.colorize();
        let styled = format!("{}", "test".style(styles.success));
        assert!(styled.contains("\x1b["), "should contain ANSI escape code");
    }

    #[test]
    fn test_no_color_flag_disables_colors() {
        let ctx = OutputContext::new(true, false);
        let styled = format!("{}", "test".style(ctx.styles.success));
        assert!(!styled.contains("\x1b["));
    }

    #[test]
    fn test_quiet_flag_is_stored() {
        assert!(OutputContext::new(false, true).quiet);
        assert!(!OutputContext::new(false, false).quiet);
    }

    #[test]
    fn test_show_progress_false_when_quiet() {
        let ctx = OutputContext::new(false, true);
        assert!(!ctx.show_progress());
    }

    // Helper method smoke tests (no_color=true avoids ANSI in test output).

    #[test]
    fn test_helpers_do_not_panic() {
        for quiet in [false, true] {
            let ctx = OutputContext::new(true, quiet);
            ctx.success("workspace ready");
            ctx.warn("database already exists");
            ctx.error("connection refused");
            ctx.info("checking ports");
            ctx.header("Workspace Health");
            ctx.kv("agent", "blue");
            ctx.kv("status", "");
        }
    }

    #[test]
    fn test_spinner_lifecycle() {
        let pb = progress::spinner("provisioning...");
        progress::finish_ok(&pb, "done");
        assert!(pb.is_finished());
    }

    #[test]
    fn test_spinner_error_finish() {
        let pb = progress::spinner("starting backend...");
        progress::finish_error(&pb, "timed out");
        assert!(pb.is_finished());
    }

    #[test]
    fn test_step_progress_without_tty_degrades_to_info() {
        use crate::lifecycle::Progress as _;
        // Test harness stdout is captured, so show_progress() is false and
        // every step must take the plain-line path without leaving a
        // spinner behind.
        let ctx = OutputContext::new(true, false);
        let steps = progress::StepProgress::new(&ctx);
        steps.step("creating git worktree");
        steps.warn("database themes_blue already exists");
        steps.step("running migrations");
        steps.done();
    }

    #[test]
    fn test_step_progress_drop_with_active_spinner_finishes_it() {
        use crate::lifecycle::Progress as _;
        let ctx = OutputContext::new(true, false);
        let steps = progress::StepProgress::new(&ctx);
        steps.step("starting backend");
        drop(steps);
    }

    #[test]
    fn test_json_error_object_shape() {
        let out = crate::output::json::format_error("boom", "config_invalid").expect("json");
        let value: serde_json::Value = serde_json::from_str(&out).expect("parse");
        assert_eq!(value["error"], true);
        assert_eq!(value["message"], "boom");
        assert_eq!(value["code"], "config_invalid");
    }

    #[test]
    fn test_error_code_maps_domain_errors() {
        use crate::errors::ConfigError;
        let err = anyhow::Error::from(ConfigError {
            violations: vec!["project name is empty".into()],
        });
        assert_eq!(crate::output::json::error_code(&err), "invalid_config");
        assert_eq!(
            crate::output::json::error_code(&anyhow::anyhow!("boom")),
            "failed"
        );
    }
}

mod proptests {
    use crate::output::OutputContext;
    use owo_colors::OwoColorize;
    use proptest::prelude::*;

    proptest! {
        /// no_color=true never produces ANSI codes
        #[test]
        fn prop_no_color_never_produces_ansi(text in "[a-zA-Z0-9 ]{1,50}") {
            let ctx = OutputContext::new(true, false);
            let styled = format!("{}", text.style(ctx.styles.success));
            prop_assert!(!styled.contains("\x1b["));
        }

        /// Helper methods never panic, quiet or not
        #[test]
        fn prop_helper_methods_do_not_panic(
            msg in "[a-zA-Z0-9 .,!?_-]{0,100}",
            quiet in proptest::bool::ANY,
        ) {
            let ctx = OutputContext::new(true, quiet);
            ctx.success(&msg);
            ctx.warn(&msg);
            ctx.error(&msg);
            ctx.info(&msg);
            ctx.header(&msg);
            ctx.kv("key", &msg);
        }
    }
}
