//! Built-in templates and the example library.

use crate::buffers::SourceBuffers;
use crate::error::LibraryError;
use serde::Serialize;

/// A named, static markup/style/script triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Example {
    pub name: &'static str,
    pub description: &'static str,
    pub markup: &'static str,
    pub style: &'static str,
    pub script: &'static str,
}

impl Example {
    pub fn to_buffers(&self) -> SourceBuffers {
        SourceBuffers::new(self.markup, self.style, self.script)
    }
}

const STARTER_MARKUP: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Code Playground</title>
</head>
<body>
    <h1>Hello World!</h1>
    <p>Start coding to see your changes live!</p>
</body>
</html>"#;

const STARTER_STYLE: &str = r#"/* Add your CSS styles here */
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    margin: 0;
    padding: 20px;
    background: #f5f5f5;
}

h1 {
    color: #333;
    text-align: center;
}

p {
    color: #666;
    text-align: center;
}"#;

const STARTER_SCRIPT: &str = r#"// Add your JavaScript code here
console.log('Code Playground ready!');

document.addEventListener('DOMContentLoaded', function() {
    console.log('DOM loaded');
});"#;

const RESET_MARKUP: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n    <meta charset=\"UTF-8\">\n    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n    <title>Code Playground</title>\n</head>\n<body>\n    \n</body>\n</html>";
const RESET_STYLE: &str = "/* Add your CSS styles here */";
const RESET_SCRIPT: &str = "// Add your JavaScript code here";

/// What the editor holds when the playground first mounts.
pub fn starter_template() -> SourceBuffers {
    SourceBuffers::new(STARTER_MARKUP, STARTER_STYLE, STARTER_SCRIPT)
}

/// What `clear` resets every buffer to.
pub fn reset_template() -> SourceBuffers {
    SourceBuffers::new(RESET_MARKUP, RESET_STYLE, RESET_SCRIPT)
}

pub const EXAMPLES: &[Example] = &[
    Example {
        name: "hello-world",
        description: "The starter page",
        markup: STARTER_MARKUP,
        style: STARTER_STYLE,
        script: STARTER_SCRIPT,
    },
    Example {
        name: "counter",
        description: "A button that counts its clicks",
        markup: r#"<main class="counter">
    <h1 id="count">0</h1>
    <button id="increment">Click me</button>
</main>"#,
        style: r#".counter {
    display: flex;
    flex-direction: column;
    align-items: center;
    gap: 1rem;
}

button {
    padding: 0.5rem 1.5rem;
    border-radius: 0.5rem;
}"#,
        script: r#"let count = 0;
const label = document.getElementById('count');
document.getElementById('increment').addEventListener('click', () => {
    count += 1;
    label.textContent = String(count);
});
console.log('counter ready');"#,
    },
    Example {
        name: "gradient-card",
        description: "A styled card with no script",
        markup: r#"<div class="card">
    <h2>Gradient Card</h2>
    <p>Pure CSS, no JavaScript.</p>
</div>"#,
        style: r#"body {
    min-height: 100vh;
    display: grid;
    place-items: center;
    background: #0f0f23;
}

.card {
    padding: 2rem;
    border-radius: 1rem;
    color: #e0e6ed;
    background: linear-gradient(135deg, #64ffda33, #bb86fc33);
}"#,
        script: "",
    },
    Example {
        name: "clock",
        description: "A clock updated every second",
        markup: r#"<p>The time is <span id="clock">--:--:--</span></p>"#,
        style: r#"#clock {
    font-family: monospace;
    font-weight: bold;
}"#,
        script: r#"const clock = document.getElementById('clock');
function tick() {
    clock.textContent = new Date().toTimeString().slice(0, 8);
}
tick();
setInterval(tick, 1000);
console.log('clock started');"#,
    },
];

pub fn find_example(name: &str) -> Result<&'static Example, LibraryError> {
    EXAMPLES
        .iter()
        .find(|example| example.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| LibraryError::UnknownExample {
            name: name.to_string(),
            available: EXAMPLES
                .iter()
                .map(|example| example.name)
                .collect::<Vec<_>>()
                .join(", "),
        })
}
