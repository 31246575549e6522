use axum::{response::Html, routing::get, Router};

pub fn router() -> Router {
    Router::new().route("/", get(index))
}

async fn index() -> Html<&'static str> {
    Html(r##"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Plot Hole - Screenplay Analyzer</title>
  <style>
    body { font-family: Arial, sans-serif; margin: 2rem auto; max-width: 52rem; color: #1d1d1f; }
    h1 { margin-bottom: 0.5rem; }
    .card { border: 1px solid #ddd; padding: 1rem; border-radius: 8px; margin-bottom: 1rem; }
    .card.locked { opacity: 0.5; pointer-events: none; }
    button { margin-top: 1rem; padding: 0.6rem 1rem; }
    code { word-break: break-all; }
    .status { margin-top: 0.75rem; white-space: pre-wrap; }
    .error { color: #b00020; }
    .ok { color: #1b7f3b; }
    #qr svg { width: 16rem; height: 16rem; }
    #critique table { border-collapse: collapse; }
    #critique td, #critique th { border: 1px solid #ccc; padding: 0.3rem 0.6rem; }
  </style>
</head>
<body>
  <h1>Plot Hole</h1>
  <p>Pay a small fee in SOL, upload your screenplay as a PDF, and get a critique of its plot holes.</p>

  <div class="card" id="payCard">
    <h2>1) Request payment</h2>
    <button id="requestBtn">Request payment</button>
    <div id="paymentInfo" hidden>
      <p>Send <strong id="amount"></strong> to <code id="recipient"></code></p>
      <div id="qr"></div>
      <p><a id="payLink" href="#">Open in wallet</a></p>
    </div>
    <div class="status" id="payStatus"></div>
  </div>

  <div class="card locked" id="confirmCard">
    <h2>2) Confirm payment</h2>
    <button id="confirmBtn">Confirm payment</button>
    <div class="status" id="confirmStatus"></div>
  </div>

  <div class="card locked" id="uploadCard">
    <h2>3) Analyze screenplay</h2>
    <input id="fileInput" type="file" accept="application/pdf,.pdf" />
    <button id="analyzeBtn">Analyze screenplay</button>
    <div class="status" id="analyzeStatus"></div>
  </div>

  <div class="card" id="resultCard" hidden>
    <h2>Critique</h2>
    <div id="critique"></div>
  </div>

  <script>
    let sessionId = null;
    const $ = (id) => document.getElementById(id);

    function show(el, text, kind) {
      el.textContent = text;
      el.className = 'status' + (kind ? ' ' + kind : '');
    }

    async function call(url, options) {
      const res = await fetch(url, options);
      const json = await res.json().catch(() => ({ error: res.statusText }));
      if (!res.ok) throw new Error(json.error || res.statusText);
      return json;
    }

    $('requestBtn').addEventListener('click', async () => {
      show($('payStatus'), 'Creating payment request...');
      try {
        const json = await call('/api/payment/request', { method: 'POST' });
        sessionId = json.session_id;
        $('amount').textContent = json.amount_sol + ' SOL';
        $('recipient').textContent = json.recipient;
        $('qr').innerHTML = json.qr_svg;
        $('payLink').href = json.payment_url;
        $('paymentInfo').hidden = false;
        $('confirmCard').classList.remove('locked');
        show($('payStatus'), json.customer_wallet_configured
          ? 'Demo wallet configured: confirming will send the payment for you.'
          : 'Scan the QR code with a Solana wallet, then confirm.');
      } catch (e) {
        show($('payStatus'), e.message, 'error');
      }
    });

    $('confirmBtn').addEventListener('click', async () => {
      if (!sessionId) return;
      show($('confirmStatus'), 'Waiting for the payment to land on chain...');
      try {
        const json = await call('/api/payment/confirm', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ session_id: sessionId })
        });
        show($('confirmStatus'), json.message + '\nSignature: ' + json.signature, 'ok');
        $('uploadCard').classList.remove('locked');
      } catch (e) {
        show($('confirmStatus'), e.message, 'error');
      }
    });

    $('analyzeBtn').addEventListener('click', async () => {
      const input = $('fileInput');
      if (!input.files.length) {
        show($('analyzeStatus'), 'Select a PDF first.', 'error');
        return;
      }
      const form = new FormData();
      form.append('session_id', sessionId);
      form.append('file', input.files[0]);
      show($('analyzeStatus'), 'Reading the screenplay and writing notes. This can take a minute...');
      try {
        const json = await call('/api/screenplay/analyze', { method: 'POST', body: form });
        if (json.outcome.status === 'completed') {
          $('critique').innerHTML = json.outcome.html;
          $('resultCard').hidden = false;
          show($('analyzeStatus'), 'Analyzed ' + json.pages + ' pages.', 'ok');
        } else {
          show($('analyzeStatus'), json.notice, 'error');
        }
      } catch (e) {
        show($('analyzeStatus'), e.message, 'error');
      }
    });
  </script>
</body>
</html>"##)
}
