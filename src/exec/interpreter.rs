/// The program that executes inline code and scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: String,
    pub inline_flag: String,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl Interpreter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            inline_flag: "-c".to_string(),
        }
    }

    /// `<program> -c <code> [input] [extra_args...]`
    pub fn inline_command(&self, code: &str, input: Option<&str>, extra_args: &[String]) -> Vec<String> {
        let mut command = vec![
            self.program.clone(),
            self.inline_flag.clone(),
            code.to_string(),
        ];
        command.extend(input.map(str::to_string));
        command.extend_from_slice(extra_args);
        command
    }

    /// `<program> <script> <input> --output <output> [extra_args...]`
    pub fn script_command(
        &self,
        script: &str,
        input: &str,
        output: &str,
        extra_args: &[String],
    ) -> Vec<String> {
        let mut command = vec![
            self.program.clone(),
            script.to_string(),
            input.to_string(),
            "--output".to_string(),
            output.to_string(),
        ];
        command.extend_from_slice(extra_args);
        command
    }
}
