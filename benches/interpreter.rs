use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mython::{interpreter, lexer, parser};

const FIB: &str = "\
class Fib:
  def of(n):
    if n < 2:
      return n
    return self.of(n - 1) + self.of(n - 2)

f = Fib()
print f.of(15)
";

fn bench_interpreter(c: &mut Criterion) {
    c.bench_function("frontend_tokenize", |b| {
        b.iter(|| {
            let tokens = lexer::tokenize(black_box(FIB)).expect("tokenize");
            black_box(tokens);
        })
    });

    c.bench_function("frontend_tokenize_parse", |b| {
        b.iter(|| {
            let lexer = lexer::Lexer::new(black_box(FIB)).expect("tokenize");
            let program = parser::parse_program(lexer).expect("parse");
            black_box(program);
        })
    });

    c.bench_function("interpreter_full_pipeline", |b| {
        b.iter(|| {
            let mut output = Vec::new();
            interpreter::run_program(black_box(FIB), &mut output).expect("run");
            black_box(output);
        })
    });
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
